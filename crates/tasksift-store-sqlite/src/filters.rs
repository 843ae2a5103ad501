use std::collections::BTreeMap;

use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use tracing::info;

use crate::{SqliteStore, StoreError};

/// A named filter as stored in the `filters` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedFilter {
    /// Row id; `None` until first saved.
    pub id: Option<i64>,
    /// Unique display title.
    pub title: String,
    /// Compiled WHERE clause with values inlined.
    pub sql: String,
    /// Persisted criteria list.
    pub criterion: String,
    /// Field defaults for tasks created under this filter.
    pub values: BTreeMap<String, String>,
    /// Position in the filter list.
    pub order: i64,
}

const FILTER_COLUMNS: &str = r#"_id, title, sql, criterion, "values", sort_order"#;

fn filter_from_row(row: &Row<'_>) -> rusqlite::Result<(SavedFilter, String)> {
    let values: String = row.get(4)?;
    Ok((
        SavedFilter {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            sql: row.get(2)?,
            criterion: row.get(3)?,
            values: BTreeMap::new(),
            order: row.get(5)?,
        },
        values,
    ))
}

fn decode(parts: (SavedFilter, String)) -> Result<SavedFilter, StoreError> {
    let (mut filter, values) = parts;
    filter.values = serde_json::from_str(&values)?;
    Ok(filter)
}

fn duplicate_title(err: rusqlite::Error, title: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            StoreError::DuplicateTitle(title.to_owned())
        }
        other => StoreError::Sql(other),
    }
}

impl SqliteStore {
    /// Insert `filter` (no id) at the end of the list, or update it in place.
    ///
    /// Returns the filter's id.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateTitle`] when another filter has the title,
    /// [`StoreError::FilterNotFound`] when updating an unknown id.
    pub fn save_filter(&self, filter: &SavedFilter) -> Result<i64, StoreError> {
        let values = serde_json::to_string(&filter.values)?;
        if let Some(id) = filter.id {
            let changed = self
                .conn
                .execute(
                    r#"UPDATE filters SET title = ?1, sql = ?2, criterion = ?3, "values" = ?4 WHERE _id = ?5"#,
                    params![filter.title, filter.sql, filter.criterion, values, id],
                )
                .map_err(|err| duplicate_title(err, &filter.title))?;
            if changed == 0 {
                return Err(StoreError::FilterNotFound(id));
            }
            info!(id, title = %filter.title, "Updated filter");
            return Ok(id);
        }
        self.conn
            .execute(
                r#"INSERT INTO filters (title, sql, criterion, "values", sort_order)
                   VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM filters))"#,
                params![filter.title, filter.sql, filter.criterion, values],
            )
            .map_err(|err| duplicate_title(err, &filter.title))?;
        let id = self.conn.last_insert_rowid();
        info!(id, title = %filter.title, "Saved filter");
        Ok(id)
    }

    /// All filters in list order.
    ///
    /// # Errors
    /// Returns an error if the query fails or stored values are corrupt.
    pub fn filters(&self) -> Result<Vec<SavedFilter>, StoreError> {
        let sql = format!("SELECT {FILTER_COLUMNS} FROM filters ORDER BY sort_order, _id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], filter_from_row)?;
        rows.map(|row| decode(row?)).collect()
    }

    /// Filter `id`, if present.
    ///
    /// # Errors
    /// Returns an error if the query fails or stored values are corrupt.
    pub fn filter(&self, id: i64) -> Result<Option<SavedFilter>, StoreError> {
        let sql = format!("SELECT {FILTER_COLUMNS} FROM filters WHERE _id = ?1");
        self.conn
            .query_row(&sql, params![id], filter_from_row)
            .optional()?
            .map(decode)
            .transpose()
    }

    /// Filter titled exactly `title`, if present.
    ///
    /// # Errors
    /// Returns an error if the query fails or stored values are corrupt.
    pub fn filter_by_title(&self, title: &str) -> Result<Option<SavedFilter>, StoreError> {
        let sql = format!("SELECT {FILTER_COLUMNS} FROM filters WHERE title = ?1");
        self.conn
            .query_row(&sql, params![title], filter_from_row)
            .optional()?
            .map(decode)
            .transpose()
    }

    /// Change the title of filter `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateTitle`] or [`StoreError::FilterNotFound`].
    pub fn rename_filter(&self, id: i64, title: &str) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("UPDATE filters SET title = ?1 WHERE _id = ?2", params![title, id])
            .map_err(|err| duplicate_title(err, title))?;
        if changed == 0 {
            return Err(StoreError::FilterNotFound(id));
        }
        info!(id, title, "Renamed filter");
        Ok(())
    }

    /// Remove filter `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::FilterNotFound`] for an unknown id.
    pub fn delete_filter(&self, id: i64) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM filters WHERE _id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::FilterNotFound(id));
        }
        info!(id, "Deleted filter");
        Ok(())
    }

    /// Move filter `id` to `position` in the list, renumbering every filter.
    ///
    /// Positions past the end move the filter last.
    ///
    /// # Errors
    /// Returns [`StoreError::FilterNotFound`] for an unknown id.
    pub fn move_filter(&mut self, id: i64, position: usize) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let mut ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT _id FROM filters ORDER BY sort_order, _id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let from = ids
            .iter()
            .position(|&candidate| candidate == id)
            .ok_or(StoreError::FilterNotFound(id))?;
        let moved = ids.remove(from);
        ids.insert(position.min(ids.len()), moved);
        for (order, filter_id) in ids.iter().enumerate() {
            tx.execute(
                "UPDATE filters SET sort_order = ?1 WHERE _id = ?2",
                params![i64::try_from(order).unwrap_or(i64::MAX), filter_id],
            )?;
        }
        tx.commit()?;
        info!(id, position, "Moved filter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> SavedFilter {
        SavedFilter {
            title: title.to_owned(),
            sql: " WHERE 1".to_owned(),
            criterion: "2|completed|".to_owned(),
            ..SavedFilter::default()
        }
    }

    #[test]
    fn insert_update_and_reload() -> Result<(), StoreError> {
        let store = SqliteStore::open_in_memory()?;
        let mut filter = draft("Errands");
        filter.values.insert("list".into(), "errands".into());
        let id = store.save_filter(&filter)?;

        filter.id = Some(id);
        filter.criterion = "0|recurring|".into();
        assert_eq!(store.save_filter(&filter)?, id);

        let loaded = store.filter(id)?.unwrap_or_else(|| panic!("filter {id} missing"));
        assert_eq!(loaded.criterion, "0|recurring|");
        assert_eq!(loaded.values.get("list").map(String::as_str), Some("errands"));
        assert_eq!(store.filter_by_title("Errands")?.map(|f| f.id), Some(Some(id)));
        Ok(())
    }

    #[test]
    fn duplicate_title_is_reported() -> Result<(), StoreError> {
        let store = SqliteStore::open_in_memory()?;
        store.save_filter(&draft("Today"))?;
        assert!(matches!(
            store.save_filter(&draft("Today")),
            Err(StoreError::DuplicateTitle(title)) if title == "Today"
        ));
        Ok(())
    }

    #[test]
    fn move_renumbers_list() -> Result<(), StoreError> {
        let mut store = SqliteStore::open_in_memory()?;
        let a = store.save_filter(&draft("a"))?;
        let b = store.save_filter(&draft("b"))?;
        let c = store.save_filter(&draft("c"))?;
        store.move_filter(c, 0)?;
        let order: Vec<_> = store.filters()?.into_iter().filter_map(|f| f.id).collect();
        assert_eq!(order, vec![c, a, b]);
        store.move_filter(c, 99)?;
        let order: Vec<_> = store.filters()?.into_iter().filter_map(|f| f.id).collect();
        assert_eq!(order, vec![a, b, c]);
        assert!(matches!(store.move_filter(1234, 0), Err(StoreError::FilterNotFound(1234))));
        Ok(())
    }

    #[test]
    fn rename_and_delete() -> Result<(), StoreError> {
        let store = SqliteStore::open_in_memory()?;
        let id = store.save_filter(&draft("old"))?;
        store.rename_filter(id, "new")?;
        assert_eq!(store.filters()?[0].title, "new");
        store.delete_filter(id)?;
        assert!(store.filters()?.is_empty());
        assert!(matches!(store.delete_filter(id), Err(StoreError::FilterNotFound(_))));
        Ok(())
    }
}
