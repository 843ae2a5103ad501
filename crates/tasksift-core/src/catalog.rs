//! Registry of the criteria a filter can be built from.

use std::sync::Arc;

use crate::criterion::{Criterion, CriterionError, DEFAULT_VALUE_MARKER, DefaultValues, SelectOption};

/// `LIKE` operand matching the bound value as a literal substring.
const CONTAINS_BOUND: &str = r"'%' || replace(replace(replace(?, '\', '\\'), '%', '\%'), '_', '\_') || '%' ESCAPE '\'";

/// Ordered set of criterion definitions, looked up by identifier.
#[derive(Debug, Clone, Default)]
pub struct CriteriaCatalog {
    criteria: Vec<Arc<Criterion>>,
}

impl CriteriaCatalog {
    /// Empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self { criteria: Vec::new() }
    }

    /// Register `criterion`.
    ///
    /// # Errors
    /// Returns [`CriterionError::Duplicate`] when the identifier is taken.
    pub fn insert(&mut self, criterion: Criterion) -> Result<Arc<Criterion>, CriterionError> {
        if self.get(criterion.identifier()).is_some() {
            return Err(CriterionError::Duplicate(criterion.identifier().to_owned()));
        }
        let criterion = Arc::new(criterion);
        self.criteria.push(Arc::clone(&criterion));
        Ok(criterion)
    }

    /// Criterion registered under `identifier`.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<Arc<Criterion>> {
        self.criteria
            .iter()
            .find(|criterion| criterion.identifier() == identifier)
            .cloned()
    }

    /// Criteria in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Criterion>> {
        self.criteria.iter()
    }

    /// Number of registered criteria.
    #[must_use]
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Built-in criteria, with tag and list pickers offering `tags` and `lists`.
    ///
    /// # Errors
    /// Returns an error only when two entries of `tags` or `lists` are equal.
    pub fn builtin(tags: &[String], lists: &[String]) -> Result<Self, CriterionError> {
        let tag_options: Vec<SelectOption> = tags.iter().cloned().map(SelectOption::plain).collect();
        let list_options: Vec<SelectOption> = lists.iter().cloned().map(SelectOption::plain).collect();

        let mut catalog = Self::new();
        catalog.insert(Criterion::single_select(
            "tag_is",
            "Tag is",
            "SELECT tags.task FROM tags WHERE tags.name = ?",
            tag_options.clone(),
            DefaultValues::new(),
        )?)?;
        catalog.insert(Criterion::multi_select(
            "tag_any",
            "Tag is any of",
            "SELECT tags.task FROM tags WHERE tags.name IN (?)",
            tag_options,
            DefaultValues::new(),
        )?)?;
        catalog.insert(Criterion::text_input(
            "tag_contains",
            "Tag contains",
            &format!("SELECT tags.task FROM tags WHERE tags.name LIKE {CONTAINS_BOUND}"),
            "Tag contains",
            "part of a tag name",
        )?)?;
        catalog.insert(Criterion::text_input(
            "title",
            "Title contains",
            &format!("SELECT tasks._id FROM tasks WHERE tasks.title LIKE {CONTAINS_BOUND}"),
            "Title contains",
            "part of the title",
        )?)?;
        catalog.insert(Criterion::text_input(
            "description",
            "Description contains",
            &format!("SELECT tasks._id FROM tasks WHERE tasks.notes LIKE {CONTAINS_BOUND}"),
            "Description contains",
            "part of the notes",
        )?)?;
        catalog.insert(Criterion::single_select(
            "importance",
            "Priority at least",
            "SELECT tasks._id FROM tasks WHERE tasks.importance <= ?",
            vec![
                SelectOption::resolved("!!!", "0"),
                SelectOption::resolved("!!", "1"),
                SelectOption::resolved("!", "2"),
                SelectOption::resolved("none", "3"),
            ],
            defaults_for("importance"),
        )?)?;
        catalog.insert(Criterion::single_select(
            "due_before",
            "Due by",
            "SELECT tasks._id FROM tasks WHERE tasks.due_date > 0 AND tasks.due_date <= ?",
            vec![
                SelectOption::resolved("yesterday", "EOD-1"),
                SelectOption::resolved("today", "EOD"),
                SelectOption::resolved("tomorrow", "EOD+1"),
                SelectOption::resolved("day after tomorrow", "EOD+2"),
                SelectOption::resolved("next week", "EOD+7"),
                SelectOption::resolved("next month", "EOD+30"),
            ],
            defaults_for("due_date"),
        )?)?;
        catalog.insert(Criterion::boolean(
            "no_due_date",
            "No due date",
            "SELECT tasks._id FROM tasks WHERE tasks.due_date = 0",
        )?)?;
        catalog.insert(Criterion::single_select(
            "list",
            "In list",
            "SELECT tasks._id FROM tasks WHERE tasks.list = ?",
            list_options,
            defaults_for("list"),
        )?)?;
        catalog.insert(Criterion::boolean(
            "recurring",
            "Repeats",
            "SELECT tasks._id FROM tasks WHERE tasks.recurrence <> ''",
        )?)?;
        catalog.insert(Criterion::boolean(
            "completed",
            "Completed",
            "SELECT tasks._id FROM tasks WHERE tasks.completed > 0",
        )?)?;
        catalog.insert(Criterion::boolean(
            "hidden",
            "Hidden until later",
            "SELECT tasks._id FROM tasks WHERE tasks.hide_until > 0",
        )?)?;
        catalog.insert(Criterion::boolean(
            "subtask",
            "Is a subtask",
            "SELECT tasks._id FROM tasks WHERE tasks.parent > 0",
        )?)?;
        catalog.insert(Criterion::boolean(
            "parent",
            "Has subtasks",
            "SELECT DISTINCT child.parent FROM tasks AS child WHERE child.parent > 0",
        )?)?;
        Ok(catalog)
    }
}

impl<'a> IntoIterator for &'a CriteriaCatalog {
    type Item = &'a Arc<Criterion>;
    type IntoIter = std::slice::Iter<'a, Arc<Criterion>>;

    fn into_iter(self) -> Self::IntoIter {
        self.criteria.iter()
    }
}

fn defaults_for(field: &str) -> DefaultValues {
    DefaultValues::from([(field.to_owned(), DEFAULT_VALUE_MARKER.to_owned())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Picker;

    #[test]
    fn builtin_catalog_offers_store_values() {
        let catalog = CriteriaCatalog::builtin(&["home".to_owned(), "work".to_owned()], &[])
            .unwrap_or_else(|err| panic!("catalog: {err}"));
        assert_eq!(catalog.len(), 14);
        let tag = catalog.get("tag_is").unwrap_or_else(|| panic!("tag_is"));
        assert!(matches!(tag.picker(), Picker::Single(options) if options.len() == 2));
        let title = catalog.get("title").unwrap_or_else(|| panic!("title"));
        assert!(matches!(title.picker(), Picker::Text { .. }));
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut catalog = CriteriaCatalog::new();
        let make = || Criterion::boolean("done", "Done", "SELECT 1").unwrap_or_else(|err| panic!("{err}"));
        assert!(catalog.insert(make()).is_ok());
        assert_eq!(
            catalog.insert(make()).err(),
            Some(CriterionError::Duplicate("done".into()))
        );
    }

    #[test]
    fn duplicate_store_values_are_reported() {
        let result = CriteriaCatalog::builtin(&["a".to_owned(), "a".to_owned()], &[]);
        assert!(matches!(result, Err(CriterionError::DuplicateOption { .. })));
    }
}
