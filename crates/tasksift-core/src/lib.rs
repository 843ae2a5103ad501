//! Criteria-based task filters: criterion model, SQL compilation, per-row counts
//! and the drag-to-reorder state machine.

/// Registry of available criteria.
pub mod catalog;
/// Persisted text form of criteria lists.
pub mod codec;
/// The criteria list engine.
pub mod criteria;
/// Criterion definitions.
pub mod criterion;
/// Drag-to-reorder gesture state.
pub mod drag;
/// Identifier types.
pub mod id;
/// Criterion instances and combinators.
pub mod instance;
/// SQL fragments and bind values.
pub mod sql;

pub use catalog::CriteriaCatalog;
pub use codec::CodecError;
pub use criteria::{CriteriaError, CriteriaList, RecomputePlan, RecomputeStep, TaskCounter};
pub use criterion::{Criterion, CriterionError, CriterionKind, DefaultValues, OptionValueKind, Picker, SelectOption};
pub use id::InstanceId;
pub use instance::{Combinator, CriterionInstance, RowCounts, Selection};
pub use sql::{SqlPredicate, SqlValue};
