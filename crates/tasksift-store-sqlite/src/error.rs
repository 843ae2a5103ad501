//! Error types for SQLite store operations.

use thiserror::Error;

/// Errors that can occur during `SqliteStore` operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite returned an error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filter default values could not be encoded or decoded.
    #[error("Failed to encode filter values: {0}")]
    Values(#[from] serde_json::Error),

    /// Task was not found in the database.
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    /// Saved filter was not found in the database.
    #[error("Filter not found: {0}")]
    FilterNotFound(i64),

    /// Another saved filter already uses this title.
    #[error("A filter named '{0}' already exists")]
    DuplicateTitle(String),

    /// SQLite reported a negative count.
    #[error("Count out of range: {0}")]
    CountOutOfRange(i64),

    /// Blocking worker could not be joined.
    #[error("Task join error: {0}")]
    Join(String),
}
