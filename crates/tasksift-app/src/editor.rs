//! Shared filter editing state with generation-guarded count refreshes.
//!
//! Edits run under one async mutex and bump the list generation. A refresh
//! plans its queries under the lock, counts without holding it, and applies the
//! result only if no edit or newer refresh happened in between. Overlapping
//! refreshes therefore always settle on the counts of the latest state.

use std::sync::Arc;

use anyhow::Error;
use tasksift_core::{Combinator, CriteriaError, CriteriaList, Criterion, CriterionInstance, InstanceId, Selection};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::async_store::AsyncTaskCounter;

/// Result of one refresh pass.
#[derive(Debug)]
pub enum RecomputeOutcome {
    /// Counts were written to the list.
    Applied,
    /// The list changed while counting; counts were discarded.
    Stale,
    /// A count query failed; the previous counts were kept.
    Failed(Error),
}

impl RecomputeOutcome {
    /// Whether counts were written.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Cloneable handle to a criteria list being edited.
#[derive(Debug, Clone, Default)]
pub struct FilterEditor {
    list: Arc<Mutex<CriteriaList>>,
}

impl FilterEditor {
    /// Start editing `list`.
    #[must_use]
    pub fn new(list: CriteriaList) -> Self {
        Self {
            list: Arc::new(Mutex::new(list)),
        }
    }

    /// Run `edit` with exclusive access to the list.
    ///
    /// # Errors
    /// Returns whatever `edit` returns.
    pub async fn apply<T, E>(&self, edit: impl FnOnce(&mut CriteriaList) -> Result<T, E>) -> Result<T, E> {
        let mut list = self.list.lock().await;
        edit(&mut list)
    }

    /// Copy of the current list.
    pub async fn snapshot(&self) -> CriteriaList {
        self.list.lock().await.clone()
    }

    /// Append a row.
    ///
    /// # Errors
    /// Returns an error when the selection does not fit or the combinator is reserved.
    pub async fn add_criterion(
        &self,
        criterion: Arc<Criterion>,
        selection: Selection,
        combinator: Combinator,
    ) -> Result<InstanceId, CriteriaError> {
        self.apply(|list| list.add_criterion_with(criterion, selection, combinator))
            .await
    }

    /// Remove the row at `index`.
    ///
    /// # Errors
    /// Rejects the universe row and out-of-range indices.
    pub async fn remove_at(&self, index: usize) -> Result<CriterionInstance, CriteriaError> {
        self.apply(|list| list.remove_at(index)).await
    }

    /// Move the row at `from` to `to`.
    ///
    /// # Errors
    /// Rejects moves touching the universe row and out-of-range indices.
    pub async fn move_to(&self, from: usize, to: usize) -> Result<(), CriteriaError> {
        self.apply(|list| list.move_to(from, to)).await
    }

    /// Change the combinator of the row at `index`.
    ///
    /// # Errors
    /// Rejects the universe row, out-of-range indices and the universe combinator.
    pub async fn set_combinator(&self, index: usize, combinator: Combinator) -> Result<(), CriteriaError> {
        self.apply(|list| list.set_combinator(index, combinator)).await
    }

    /// Replace the chosen value of the row at `index`.
    ///
    /// # Errors
    /// Rejects the universe row, out-of-range indices and selections not fitting the kind.
    pub async fn set_selection(&self, index: usize, selection: Selection) -> Result<(), CriteriaError> {
        self.apply(|list| list.set_selection(index, selection)).await
    }

    /// Recount every row against `counter`.
    pub async fn refresh<C: AsyncTaskCounter>(&self, counter: &C, now: OffsetDateTime) -> RecomputeOutcome {
        let plan = self.list.lock().await.plan_recompute(now);
        let mut counts = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            match counter.count(&step.predicate).await {
                Ok(count) => counts.push(count),
                Err(err) => {
                    let err: Error = err.into();
                    warn!(generation = plan.generation, error = %err, "Count query failed; keeping previous counts");
                    return RecomputeOutcome::Failed(err);
                }
            }
        }
        if self.list.lock().await.apply_counts(&plan, &counts) {
            debug!(generation = plan.generation, rows = counts.len(), "Applied row counts");
            RecomputeOutcome::Applied
        } else {
            RecomputeOutcome::Stale
        }
    }

    /// Run [`Self::refresh`] on the current tokio runtime.
    pub fn spawn_refresh<C>(&self, counter: C, now: OffsetDateTime) -> JoinHandle<RecomputeOutcome>
    where
        C: AsyncTaskCounter + 'static,
    {
        let editor = self.clone();
        tokio::spawn(async move { editor.refresh(&counter, now).await })
    }
}
