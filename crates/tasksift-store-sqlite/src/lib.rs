//! SQLite-backed task database for tasksift.
//!
//! Holds the task table the criteria compile against, task tags, and saved
//! filters. Every query built from a criteria list runs with bound parameters.

mod error;
mod filters;
mod tasks;

pub use error::StoreError;
pub use filters::SavedFilter;
pub use tasks::{NewTask, TaskRow};

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use tasksift_core::{SqlPredicate, SqlValue, TaskCounter};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      title TEXT NOT NULL,
      notes TEXT NOT NULL DEFAULT '',
      importance INTEGER NOT NULL DEFAULT 3 CHECK (importance BETWEEN 0 AND 3),
      due_date INTEGER NOT NULL DEFAULT 0,
      hide_until INTEGER NOT NULL DEFAULT 0,
      completed INTEGER NOT NULL DEFAULT 0,
      deleted INTEGER NOT NULL DEFAULT 0,
      recurrence TEXT NOT NULL DEFAULT '',
      parent INTEGER NOT NULL DEFAULT 0,
      list TEXT NOT NULL DEFAULT '',
      created INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tags (
      task INTEGER NOT NULL REFERENCES tasks(_id) ON DELETE CASCADE,
      name TEXT NOT NULL,
      PRIMARY KEY (task, name)
    );

    CREATE TABLE IF NOT EXISTS filters (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      title TEXT NOT NULL UNIQUE,
      sql TEXT NOT NULL,
      criterion TEXT NOT NULL,
      "values" TEXT NOT NULL DEFAULT '{}',
      sort_order INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name);
    CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent);
"#;

/// Task database in a single SQLite file (or in memory).
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory or database cannot be created, or the
    /// schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.migrate()?;
        info!(path = ?store.path, "Opened task database");
        Ok(store)
    }

    /// Fresh database that lives only as long as the store.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Location of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Number of tasks matching `predicate`.
    ///
    /// # Errors
    /// Returns an error if the statement fails to prepare or run.
    pub fn count(&self, predicate: &SqlPredicate) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM tasks WHERE {}", predicate.sql());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind_values(predicate)), |row| row.get(0))?;
        debug!(count, sql = %predicate.sql(), "Counted tasks");
        u64::try_from(count).map_err(|_| StoreError::CountOutOfRange(count))
    }

    /// Distinct tag names in alphabetical order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn tag_names(&self) -> Result<Vec<String>, StoreError> {
        self.strings("SELECT DISTINCT name FROM tags ORDER BY name")
    }

    /// Distinct non-empty list names in alphabetical order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_names(&self) -> Result<Vec<String>, StoreError> {
        self.strings("SELECT DISTINCT list FROM tasks WHERE list <> '' ORDER BY list")
    }

    fn strings(&self, sql: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

impl TaskCounter for SqliteStore {
    type Error = StoreError;

    fn count(&self, predicate: &SqlPredicate) -> Result<u64, Self::Error> {
        Self::count(self, predicate)
    }
}

/// SQLite values for the predicate's parameters, in placeholder order.
pub(crate) fn bind_values(predicate: &SqlPredicate) -> Vec<Value> {
    predicate.params().iter().map(to_value).collect()
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::Integer(*number),
        SqlValue::Text(text) => Value::Text(text.clone()),
    }
}
