//! Assemble the criteria catalog for a project.

use anyhow::{Context, Result};
use tasksift_core::CriteriaCatalog;
use tasksift_store_sqlite::SqliteStore;
use tracing::debug;

use crate::config::ProjectConfig;

/// Built-in criteria over the store's current tags and lists, plus configured ones.
///
/// # Errors
/// Returns an error when the store cannot be read or a configured criterion
/// collides with an existing identifier.
pub fn load_catalog(store: &SqliteStore, config: &ProjectConfig) -> Result<CriteriaCatalog> {
    let tags = store.tag_names().context("failed to read tag names")?;
    let lists = store.list_names().context("failed to read list names")?;
    catalog_with(&tags, &lists, config)
}

/// Same as [`load_catalog`] with tag and list names supplied directly.
///
/// # Errors
/// Returns an error when a configured criterion is invalid or collides with an
/// existing identifier.
pub fn catalog_with(tags: &[String], lists: &[String], config: &ProjectConfig) -> Result<CriteriaCatalog> {
    let mut catalog = CriteriaCatalog::builtin(tags, lists).context("failed to build built-in criteria")?;
    for criterion in config.custom_criteria()? {
        let identifier = criterion.identifier().to_owned();
        catalog
            .insert(criterion)
            .with_context(|| format!("cannot register criterion `{identifier}`"))?;
    }
    debug!(criteria = catalog.len(), tags = tags.len(), lists = lists.len(), "Loaded criteria catalog");
    Ok(catalog)
}
