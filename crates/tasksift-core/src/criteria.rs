//! The criteria list: ordered rows compiled to one WHERE clause, with per-row counts.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::{
    criterion::{Criterion, DefaultValues},
    id::InstanceId,
    instance::{Combinator, CriterionInstance, RowCounts, Selection},
    sql::{PredicateBuilder, SqlPredicate, active_and_visible, task_id_in},
};

/// Errors raised by list edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriteriaError {
    /// The universe row cannot be moved, removed or re-combined.
    #[error("the first row is fixed")]
    UniverseLocked,
    /// Index past the end of the list.
    #[error("row {index} is out of range (list has {len} rows)")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Current row count.
        len: usize,
    },
    /// `Combinator::Universe` was requested for a user row.
    #[error("only the first row can use the universe combinator")]
    UniverseCombinator,
    /// The selection does not fit the criterion kind.
    #[error("criterion `{identifier}` takes {expected} value")]
    SelectionMismatch {
        /// Criterion identifier.
        identifier: String,
        /// Description of the accepted selection.
        expected: &'static str,
    },
}

/// Source of task counts for a predicate.
pub trait TaskCounter {
    /// Error raised when a count query fails.
    type Error;

    /// Number of tasks matching `predicate`.
    ///
    /// # Errors
    /// Returns the backend's error when the query fails.
    fn count(&self, predicate: &SqlPredicate) -> Result<u64, Self::Error>;
}

/// One count query of a recompute pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeStep {
    /// Row the count belongs to.
    pub id: InstanceId,
    /// Predicate accumulated through that row.
    pub predicate: SqlPredicate,
}

/// Queries for one recompute pass, tagged with the generation they were planned at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputePlan {
    /// Generation of the list when the plan was taken.
    pub generation: u64,
    /// One step per row, in row order.
    pub steps: Vec<RecomputeStep>,
}

/// Ordered criterion instances forming one filter.
///
/// Row 0 is always the universe row. Every edit bumps [`Self::generation`], so
/// counts computed for an older state can be recognised and dropped.
#[derive(Debug, Clone)]
pub struct CriteriaList {
    rows: Vec<CriterionInstance>,
    generation: u64,
}

impl Default for CriteriaList {
    fn default() -> Self {
        Self::new()
    }
}

impl CriteriaList {
    /// List holding only the universe row.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: vec![universe_row()],
            generation: 0,
        }
    }

    /// Universe row followed by `rows`, which must not contain another universe row.
    pub(crate) fn from_user_rows(rows: Vec<CriterionInstance>) -> Self {
        let mut list = Self::new();
        list.rows.extend(rows);
        list
    }

    /// All rows, universe first.
    #[must_use]
    pub fn rows(&self) -> &[CriterionInstance] {
        &self.rows
    }

    /// Number of rows including the universe row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether only the universe row is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.len() <= 1
    }

    /// Edit generation; increases on every edit and every planned pass.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Position of the row with `id`.
    #[must_use]
    pub fn index_of(&self, id: InstanceId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }

    /// Append `criterion` joined with AND.
    ///
    /// # Errors
    /// Returns [`CriteriaError::SelectionMismatch`] when the selection does not fit.
    pub fn add_criterion(
        &mut self,
        criterion: Arc<Criterion>,
        selection: Selection,
    ) -> Result<InstanceId, CriteriaError> {
        self.add_criterion_with(criterion, selection, Combinator::Intersect)
    }

    /// Append `criterion` with an explicit combinator.
    ///
    /// # Errors
    /// Returns an error for a mismatched selection or the universe combinator.
    pub fn add_criterion_with(
        &mut self,
        criterion: Arc<Criterion>,
        selection: Selection,
        combinator: Combinator,
    ) -> Result<InstanceId, CriteriaError> {
        if combinator == Combinator::Universe {
            return Err(CriteriaError::UniverseCombinator);
        }
        check_selection(&criterion, &selection)?;
        let row = CriterionInstance::new(criterion, combinator, selection);
        let id = row.id;
        self.rows.push(row);
        self.bump();
        Ok(id)
    }

    /// Remove and return the row at `index`.
    ///
    /// # Errors
    /// Returns [`CriteriaError::UniverseLocked`] for index 0 and
    /// [`CriteriaError::OutOfRange`] past the end; the list is unchanged.
    pub fn remove_at(&mut self, index: usize) -> Result<CriterionInstance, CriteriaError> {
        self.check_user_index(index)?;
        let row = self.rows.remove(index);
        self.bump();
        Ok(row)
    }

    /// Move the row at `from` to `to`, keeping the other rows in order.
    ///
    /// # Errors
    /// Rejects moves touching index 0 or past the end; the list is unchanged.
    pub fn move_to(&mut self, from: usize, to: usize) -> Result<(), CriteriaError> {
        self.check_user_index(from)?;
        self.check_user_index(to)?;
        if from != to {
            let row = self.rows.remove(from);
            self.rows.insert(to, row);
        }
        self.bump();
        Ok(())
    }

    /// Change how the row at `index` joins the rows above.
    ///
    /// # Errors
    /// Rejects index 0, out-of-range indices and the universe combinator.
    pub fn set_combinator(&mut self, index: usize, combinator: Combinator) -> Result<(), CriteriaError> {
        self.check_user_index(index)?;
        if combinator == Combinator::Universe {
            return Err(CriteriaError::UniverseCombinator);
        }
        self.rows[index].combinator = combinator;
        self.bump();
        Ok(())
    }

    /// Replace the chosen value of the row at `index`.
    ///
    /// # Errors
    /// Rejects index 0, out-of-range indices and selections not fitting the kind.
    pub fn set_selection(&mut self, index: usize, selection: Selection) -> Result<(), CriteriaError> {
        self.check_user_index(index)?;
        check_selection(&self.rows[index].criterion, &selection)?;
        self.rows[index].selection = selection;
        self.bump();
        Ok(())
    }

    /// Compiled predicate with positional binds.
    #[must_use]
    pub fn to_predicate(&self, now: OffsetDateTime) -> SqlPredicate {
        let mut builder = PredicateBuilder::new();
        for row in &self.rows {
            builder.push(row.combinator, &row_fragment(row, now));
        }
        builder.build()
    }

    /// `" WHERE "` plus the compiled predicate with values inlined as literals.
    #[must_use]
    pub fn to_sql(&self, now: OffsetDateTime) -> String {
        format!(" WHERE {}", self.to_predicate(now).render_inline())
    }

    /// Predicate accumulated through each row, in row order.
    #[must_use]
    pub fn row_predicates(&self, now: OffsetDateTime) -> Vec<(InstanceId, SqlPredicate)> {
        let mut builder = PredicateBuilder::new();
        self.rows
            .iter()
            .map(|row| {
                builder.push(row.combinator, &row_fragment(row, now));
                (row.id, builder.build())
            })
            .collect()
    }

    /// Take a snapshot of the count queries for the current state.
    ///
    /// Bumps the generation, so any plan taken earlier becomes stale.
    pub fn plan_recompute(&mut self, now: OffsetDateTime) -> RecomputePlan {
        self.bump();
        let steps = self
            .row_predicates(now)
            .into_iter()
            .map(|(id, predicate)| RecomputeStep { id, predicate })
            .collect();
        RecomputePlan {
            generation: self.generation,
            steps,
        }
    }

    /// Write counts gathered for `plan`.
    ///
    /// Returns `false` and leaves the rows untouched when the plan is no longer
    /// the latest or does not line up with the current rows.
    pub fn apply_counts(&mut self, plan: &RecomputePlan, counts: &[u64]) -> bool {
        if plan.generation != self.generation {
            debug!(
                planned = plan.generation,
                current = self.generation,
                "discarding counts for an outdated list"
            );
            return false;
        }
        let aligned = plan.steps.len() == self.rows.len()
            && counts.len() == self.rows.len()
            && plan.steps.iter().zip(&self.rows).all(|(step, row)| step.id == row.id);
        if !aligned {
            debug!("discarding counts that do not match the rows");
            return false;
        }
        let max = counts.iter().copied().max().unwrap_or(0);
        let mut start = 0;
        for (row, &end) in self.rows.iter_mut().zip(counts) {
            row.counts = RowCounts { start, end, max };
            start = end;
        }
        true
    }

    /// Run one synchronous pass against `counter`.
    ///
    /// All counts are gathered before any is written, so a failing query leaves
    /// the previous counts in place.
    ///
    /// # Errors
    /// Returns the first error raised by `counter`.
    pub fn recompute<C: TaskCounter>(&mut self, counter: &C, now: OffsetDateTime) -> Result<(), C::Error> {
        let plan = self.plan_recompute(now);
        let counts = plan
            .steps
            .iter()
            .map(|step| counter.count(&step.predicate))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rows = counts.len(), "recomputed row counts");
        self.apply_counts(&plan, &counts);
        Ok(())
    }

    /// Field defaults for tasks created while this filter is shown.
    ///
    /// Only AND rows contribute; later rows win on conflicting keys.
    #[must_use]
    pub fn values_for_new_tasks(&self) -> DefaultValues {
        self.rows
            .iter()
            .filter(|row| row.combinator.narrows())
            .flat_map(|row| row.criterion.defaults_for(&row.selection))
            .collect()
    }

    fn check_user_index(&self, index: usize) -> Result<(), CriteriaError> {
        if index == 0 {
            return Err(CriteriaError::UniverseLocked);
        }
        if index >= self.rows.len() {
            return Err(CriteriaError::OutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        Ok(())
    }

    const fn bump(&mut self) {
        self.generation += 1;
    }
}

fn universe_row() -> CriterionInstance {
    CriterionInstance::new(Arc::new(Criterion::universe()), Combinator::Universe, Selection::None)
}

fn row_fragment(row: &CriterionInstance, now: OffsetDateTime) -> SqlPredicate {
    match row.combinator {
        Combinator::Universe => active_and_visible(now),
        _ => task_id_in(&row.criterion.bind(&row.selection, now)),
    }
}

pub(crate) fn check_selection(criterion: &Criterion, selection: &Selection) -> Result<(), CriteriaError> {
    if criterion.accepts(selection) {
        Ok(())
    } else {
        Err(CriteriaError::SelectionMismatch {
            identifier: criterion.identifier().to_owned(),
            expected: criterion.expected_selection(),
        })
    }
}
