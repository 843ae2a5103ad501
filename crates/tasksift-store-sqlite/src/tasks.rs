use rusqlite::{Row, params, params_from_iter};
use tasksift_core::SqlPredicate;
use tasksift_core::sql::epoch_millis;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{SqliteStore, StoreError, bind_values};

/// Fields for a task to be inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Task title.
    pub title: String,
    /// Free-form notes.
    pub notes: String,
    /// 0 (highest) to 3 (none); `None` stores 3.
    pub importance: Option<u8>,
    /// Due date.
    pub due_date: Option<OffsetDateTime>,
    /// Hidden from the active list until this instant.
    pub hide_until: Option<OffsetDateTime>,
    /// Recurrence rule text.
    pub recurrence: Option<String>,
    /// Parent task id.
    pub parent: Option<i64>,
    /// Owning list name.
    pub list: Option<String>,
    /// Tag names.
    pub tags: Vec<String>,
}

impl NewTask {
    /// Task with only a title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Task as read back from the database. Timestamps are epoch milliseconds, 0 when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    /// Row id.
    pub id: i64,
    /// Task title.
    pub title: String,
    /// Free-form notes.
    pub notes: String,
    /// 0 (highest) to 3 (none).
    pub importance: i64,
    /// Due date.
    pub due_date: i64,
    /// Hidden until.
    pub hide_until: i64,
    /// Completion time.
    pub completed: i64,
    /// Owning list name, empty when none.
    pub list: String,
    /// Parent task id, 0 when none.
    pub parent: i64,
    /// Tag names in alphabetical order.
    pub tags: Vec<String>,
}

const TAG_SEPARATOR: char = '\u{1f}';

const TASK_COLUMNS: &str = "tasks._id, tasks.title, tasks.notes, tasks.importance, tasks.due_date, \
     tasks.hide_until, tasks.completed, tasks.list, tasks.parent, \
     (SELECT group_concat(name, char(31)) FROM (SELECT name FROM tags WHERE tags.task = tasks._id ORDER BY name))";

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tags: Option<String> = row.get(9)?;
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            notes: row.get(2)?,
            importance: row.get(3)?,
            due_date: row.get(4)?,
            hide_until: row.get(5)?,
            completed: row.get(6)?,
            list: row.get(7)?,
            parent: row.get(8)?,
            tags: tags
                .map(|joined| joined.split(TAG_SEPARATOR).map(str::to_owned).collect())
                .unwrap_or_default(),
        })
    }
}

fn optional_millis(at: Option<OffsetDateTime>) -> i64 {
    at.map_or(0, epoch_millis)
}

impl SqliteStore {
    /// Insert `task` with its tags and return the new row id.
    ///
    /// # Errors
    /// Returns an error if the insert fails; nothing is written in that case.
    pub fn insert_task(&mut self, task: &NewTask, now: OffsetDateTime) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (title, notes, importance, due_date, hide_until, recurrence, parent, list, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.title,
                task.notes,
                task.importance.unwrap_or(3),
                optional_millis(task.due_date),
                optional_millis(task.hide_until),
                task.recurrence.as_deref().unwrap_or_default(),
                task.parent.unwrap_or(0),
                task.list.as_deref().unwrap_or_default(),
                epoch_millis(now),
            ],
        )?;
        let id = tx.last_insert_rowid();
        for tag in &task.tags {
            tx.execute(
                "INSERT OR IGNORE INTO tags (task, name) VALUES (?1, ?2)",
                params![id, tag],
            )?;
        }
        tx.commit()?;
        info!(id, title = %task.title, "Inserted task");
        Ok(id)
    }

    /// Attach `tag` to task `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::TaskNotFound`] for an unknown task.
    pub fn tag_task(&self, id: i64, tag: &str) -> Result<(), StoreError> {
        self.ensure_task(id)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO tags (task, name) VALUES (?1, ?2)",
            params![id, tag],
        )?;
        Ok(())
    }

    /// Mark task `id` completed at `at`.
    ///
    /// # Errors
    /// Returns [`StoreError::TaskNotFound`] for an unknown task.
    pub fn complete_task(&self, id: i64, at: OffsetDateTime) -> Result<(), StoreError> {
        self.update_timestamp(id, "completed", at)
    }

    /// Mark task `id` deleted at `at`.
    ///
    /// # Errors
    /// Returns [`StoreError::TaskNotFound`] for an unknown task.
    pub fn delete_task(&self, id: i64, at: OffsetDateTime) -> Result<(), StoreError> {
        self.update_timestamp(id, "deleted", at)
    }

    fn update_timestamp(&self, id: i64, column: &str, at: OffsetDateTime) -> Result<(), StoreError> {
        let sql = format!("UPDATE tasks SET {column} = ?1 WHERE _id = ?2");
        let changed = self.conn.execute(&sql, params![epoch_millis(at), id])?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        debug!(id, column, "Updated task timestamp");
        Ok(())
    }

    fn ensure_task(&self, id: i64) -> Result<(), StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM tasks WHERE _id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists { Ok(()) } else { Err(StoreError::TaskNotFound(id)) }
    }

    /// Task `id`, if present.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn task(&self, id: i64) -> Result<Option<TaskRow>, StoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE tasks._id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], TaskRow::from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Tasks matching `predicate`, most important and soonest due first.
    ///
    /// # Errors
    /// Returns an error if the statement fails to prepare or run.
    pub fn search(&self, predicate: &SqlPredicate, limit: usize) -> Result<Vec<TaskRow>, StoreError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {} \
             ORDER BY tasks.importance, tasks.due_date = 0, tasks.due_date, tasks._id LIMIT {}",
            predicate.sql(),
            i64::try_from(limit).unwrap_or(i64::MAX),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind_values(predicate)), TaskRow::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
