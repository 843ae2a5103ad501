//! Async counting for use from a tokio runtime.

use anyhow::Error;
use std::future::Future;
use std::sync::Arc;
use tasksift_core::SqlPredicate;
use tasksift_store_sqlite::{SqliteStore, StoreError};
use tokio::sync::Mutex;

/// Async counterpart of [`tasksift_core::TaskCounter`].
pub trait AsyncTaskCounter: Send + Sync {
    /// Error type bubbled up from the backing store.
    type Error: Into<Error> + Send;

    /// Number of tasks matching `predicate`.
    ///
    /// # Errors
    /// Returns a store-specific error when the query fails.
    fn count(&self, predicate: &SqlPredicate) -> impl Future<Output = Result<u64, Self::Error>> + Send;
}

impl AsyncTaskCounter for Arc<Mutex<SqliteStore>> {
    type Error = StoreError;

    async fn count(&self, predicate: &SqlPredicate) -> Result<u64, Self::Error> {
        let store = Arc::clone(self);
        let predicate = predicate.clone();
        // SQLite calls block; keep them off the async workers.
        tokio::task::spawn_blocking(move || store.blocking_lock().count(&predicate))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}
