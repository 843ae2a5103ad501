//! Application layer logic for tasksift.
//!
//! This crate provides configuration, the criteria catalog, saved-filter
//! services and the async filter editor shared by the CLI and TUI.

pub mod async_store;
pub mod catalog;
pub mod config;
pub mod editor;
pub mod filter_service;
pub mod task_defaults;

// Re-exports for convenience
pub use async_store::AsyncTaskCounter;
pub use catalog::{catalog_with, load_catalog};
pub use config::{CONFIG_DIR, CriterionConfig, CriterionKindConfig, EditorConfig, ProjectConfig, StoreConfig};
pub use editor::{FilterEditor, RecomputeOutcome};
pub use filter_service::{FilterRef, FilterService, FilterStore, SaveError, ValidationError};
pub use task_defaults::apply_defaults;
