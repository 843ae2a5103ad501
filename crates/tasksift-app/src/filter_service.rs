//! Saving, loading and organising named filters.

use anyhow::{Context, Error, Result};
use tasksift_core::{CriteriaCatalog, CriteriaList};
use tasksift_store_sqlite::{SavedFilter, SqliteStore, StoreError};
use time::OffsetDateTime;
use tracing::info;

/// Storage required by [`FilterService`].
pub trait FilterStore {
    /// Error type bubbled up from the backing store.
    type Error: Into<Error>;

    /// Insert or update `filter`, returning its id.
    ///
    /// # Errors
    /// Returns a store-specific error when persisting fails.
    fn save_filter(&mut self, filter: &SavedFilter) -> Result<i64, Self::Error>;

    /// All filters in list order.
    ///
    /// # Errors
    /// Returns a store-specific error when listing fails.
    fn filters(&self) -> Result<Vec<SavedFilter>, Self::Error>;

    /// Filter `id`, if present.
    ///
    /// # Errors
    /// Returns a store-specific error when the lookup fails.
    fn filter(&self, id: i64) -> Result<Option<SavedFilter>, Self::Error>;

    /// Filter titled `title`, if present.
    ///
    /// # Errors
    /// Returns a store-specific error when the lookup fails.
    fn filter_by_title(&self, title: &str) -> Result<Option<SavedFilter>, Self::Error>;

    /// Retitle filter `id`.
    ///
    /// # Errors
    /// Returns a store-specific error when the update fails.
    fn rename_filter(&mut self, id: i64, title: &str) -> Result<(), Self::Error>;

    /// Remove filter `id`.
    ///
    /// # Errors
    /// Returns a store-specific error when the delete fails.
    fn delete_filter(&mut self, id: i64) -> Result<(), Self::Error>;

    /// Move filter `id` to `position`.
    ///
    /// # Errors
    /// Returns a store-specific error when the reorder fails.
    fn move_filter(&mut self, id: i64, position: usize) -> Result<(), Self::Error>;
}

impl FilterStore for SqliteStore {
    type Error = StoreError;

    fn save_filter(&mut self, filter: &SavedFilter) -> Result<i64, Self::Error> {
        Self::save_filter(self, filter)
    }

    fn filters(&self) -> Result<Vec<SavedFilter>, Self::Error> {
        Self::filters(self)
    }

    fn filter(&self, id: i64) -> Result<Option<SavedFilter>, Self::Error> {
        Self::filter(self, id)
    }

    fn filter_by_title(&self, title: &str) -> Result<Option<SavedFilter>, Self::Error> {
        Self::filter_by_title(self, title)
    }

    fn rename_filter(&mut self, id: i64, title: &str) -> Result<(), Self::Error> {
        Self::rename_filter(self, id, title)
    }

    fn delete_filter(&mut self, id: i64) -> Result<(), Self::Error> {
        Self::delete_filter(self, id)
    }

    fn move_filter(&mut self, id: i64, position: usize) -> Result<(), Self::Error> {
        Self::move_filter(self, id, position)
    }
}

impl<T: FilterStore> FilterStore for &mut T {
    type Error = T::Error;

    fn save_filter(&mut self, filter: &SavedFilter) -> Result<i64, Self::Error> {
        T::save_filter(self, filter)
    }

    fn filters(&self) -> Result<Vec<SavedFilter>, Self::Error> {
        T::filters(self)
    }

    fn filter(&self, id: i64) -> Result<Option<SavedFilter>, Self::Error> {
        T::filter(self, id)
    }

    fn filter_by_title(&self, title: &str) -> Result<Option<SavedFilter>, Self::Error> {
        T::filter_by_title(self, title)
    }

    fn rename_filter(&mut self, id: i64, title: &str) -> Result<(), Self::Error> {
        T::rename_filter(self, id, title)
    }

    fn delete_filter(&mut self, id: i64) -> Result<(), Self::Error> {
        T::delete_filter(self, id)
    }

    fn move_filter(&mut self, id: i64, position: usize) -> Result<(), Self::Error> {
        T::move_filter(self, id, position)
    }
}

/// Reasons a filter cannot be saved as requested.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The title is blank.
    #[error("filter title must not be empty")]
    EmptyTitle,
    /// Another filter already uses the title.
    #[error("a filter named '{0}' already exists")]
    DuplicateTitle(String),
    /// The list holds only the universe row.
    #[error("add at least one criterion before saving")]
    NoCriteria,
}

/// Errors surfaced by [`FilterService`] writes.
#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    /// The request was rejected before touching the store.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Backing store returned an error.
    #[error("store error: {0}")]
    Store(Error),
}

/// Which saved filter an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRef {
    /// By row id.
    Id(i64),
    /// By exact title.
    Title(String),
    /// Numeric text: the filter with that id, else the one with that exact title.
    IdOrTitle(i64, String),
}

impl FilterRef {
    /// Numeric text may name an id or a title; anything else is a title.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse()
            .map_or_else(|_| Self::Title(raw.to_owned()), |id| Self::IdOrTitle(id, raw.to_owned()))
    }
}

/// High-level service that validates and persists named filters.
pub struct FilterService<S> {
    store: S,
}

impl<S> FilterService<S> {
    /// Construct a new service.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Expose a reference to the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S: FilterStore> FilterService<S> {
    fn store_error(err: S::Error) -> SaveError {
        SaveError::Store(err.into())
    }

    /// Check that `title` and `list` can be saved as filter `id` (`None` for a new filter).
    ///
    /// Returns the trimmed title.
    ///
    /// # Errors
    /// Returns [`SaveError::Invalid`] for a blank or taken title or a list
    /// without criteria.
    pub fn validate(&self, id: Option<i64>, title: &str, list: &CriteriaList) -> Result<String, SaveError> {
        let title = self.validate_title(id, title)?;
        if list.is_empty() {
            return Err(ValidationError::NoCriteria.into());
        }
        Ok(title)
    }

    fn validate_title(&self, id: Option<i64>, title: &str) -> Result<String, SaveError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let existing = self.store.filter_by_title(title).map_err(Self::store_error)?;
        if existing.is_some_and(|filter| filter.id != id) {
            return Err(ValidationError::DuplicateTitle(title.to_owned()).into());
        }
        Ok(title.to_owned())
    }

    /// Validate and persist `list` under `title`, updating filter `id` when given.
    ///
    /// # Errors
    /// Returns [`SaveError::Invalid`] when validation fails and
    /// [`SaveError::Store`] when the store rejects the write.
    pub fn save(
        &mut self,
        id: Option<i64>,
        title: &str,
        list: &CriteriaList,
        now: OffsetDateTime,
    ) -> Result<SavedFilter, SaveError> {
        let title = self.validate(id, title, list)?;
        let mut filter = SavedFilter {
            id,
            title,
            sql: list.to_sql(now),
            criterion: list.serialize(),
            values: list.values_for_new_tasks(),
            order: 0,
        };
        let saved_id = self.store.save_filter(&filter).map_err(Self::store_error)?;
        filter.id = Some(saved_id);
        info!(id = saved_id, title = %filter.title, rows = list.len(), "Saved filter");
        Ok(filter)
    }

    /// All saved filters in list order.
    ///
    /// # Errors
    /// Returns an error if the store cannot list filters.
    pub fn list(&self) -> Result<Vec<SavedFilter>> {
        self.store
            .filters()
            .map_err(Into::into)
            .context("failed to list filters")
    }

    /// Look up a saved filter.
    ///
    /// # Errors
    /// Returns an error if the filter does not exist or the lookup fails.
    pub fn find(&self, target: &FilterRef) -> Result<SavedFilter> {
        let found = match target {
            FilterRef::Id(id) => self.store.filter(*id),
            FilterRef::Title(title) => self.store.filter_by_title(title),
            FilterRef::IdOrTitle(id, title) => match self.store.filter(*id) {
                Ok(None) => self.store.filter_by_title(title),
                found => found,
            },
        }
        .map_err(Into::into)
        .context("failed to look up filter")?;
        found.with_context(|| match target {
            FilterRef::Id(id) => format!("no filter with id {id}"),
            FilterRef::Title(title) => format!("no filter named '{title}'"),
            FilterRef::IdOrTitle(id, title) => format!("no filter with id {id} or named '{title}'"),
        })
    }

    /// Look up a saved filter and rebuild its criteria list.
    ///
    /// Malformed stored criteria load as the universe row alone.
    ///
    /// # Errors
    /// Returns an error if the filter does not exist or the lookup fails.
    pub fn load(&self, target: &FilterRef, catalog: &CriteriaCatalog) -> Result<(SavedFilter, CriteriaList)> {
        let filter = self.find(target)?;
        let list = CriteriaList::deserialize(&filter.criterion, catalog);
        Ok((filter, list))
    }

    /// Retitle a saved filter.
    ///
    /// # Errors
    /// Returns [`SaveError::Invalid`] for a blank or taken title.
    pub fn rename(&mut self, target: &FilterRef, title: &str) -> Result<SavedFilter, SaveError> {
        let mut filter = self.find(target).map_err(SaveError::Store)?;
        let title = self.validate_title(filter.id, title)?;
        let id = filter.id.ok_or_else(|| SaveError::Store(anyhow::anyhow!("stored filter has no id")))?;
        self.store.rename_filter(id, &title).map_err(Self::store_error)?;
        filter.title = title;
        Ok(filter)
    }

    /// Delete a saved filter and return what was removed.
    ///
    /// # Errors
    /// Returns an error if the filter does not exist or the delete fails.
    pub fn delete(&mut self, target: &FilterRef) -> Result<SavedFilter> {
        let filter = self.find(target)?;
        let id = filter.id.context("stored filter has no id")?;
        self.store
            .delete_filter(id)
            .map_err(Into::into)
            .context("failed to delete filter")?;
        Ok(filter)
    }

    /// Move a saved filter to `position` in the list.
    ///
    /// # Errors
    /// Returns an error if the filter does not exist or the reorder fails.
    pub fn reorder(&mut self, target: &FilterRef, position: usize) -> Result<()> {
        let filter = self.find(target)?;
        let id = filter.id.context("stored filter has no id")?;
        self.store
            .move_filter(id, position)
            .map_err(Into::into)
            .context("failed to move filter")
    }
}
