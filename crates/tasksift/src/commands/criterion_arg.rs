use std::str::FromStr;

use anyhow::{Context, Result};
use tasksift_app::EditorConfig;
use tasksift_core::{Combinator, CriteriaCatalog, CriteriaList, Criterion, CriterionKind, SelectOption, Selection};

/// Errors produced while parsing or resolving `--criterion` arguments.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CriterionArgError {
    #[error("criterion identifier is missing")]
    MissingIdentifier,
    #[error("unknown criterion `{0}` (see `tasksift criteria`)")]
    UnknownCriterion(String),
    #[error("criterion `{0}` takes no value")]
    UnexpectedValue(String),
    #[error("criterion `{0}` needs a value")]
    MissingValue(String),
}

/// One `[and:|or:|not:]identifier[=value[,value...]]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionArg {
    pub combinator: Option<Combinator>,
    pub identifier: String,
    pub value: Option<String>,
}

impl FromStr for CriterionArg {
    type Err = CriterionArgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (combinator, rest) = match s.split_once(':') {
            Some((head, rest)) => match head.parse::<Combinator>() {
                Ok(combinator) => (Some(combinator), rest),
                Err(_) => (None, s),
            },
            None => (None, s),
        };
        let (identifier, value) = match rest.split_once('=') {
            Some((identifier, value)) => (identifier, Some(value.to_owned())),
            None => (rest, None),
        };
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(CriterionArgError::MissingIdentifier);
        }
        Ok(Self {
            combinator,
            identifier: identifier.to_owned(),
            value,
        })
    }
}

impl CriterionArg {
    /// Selection for `criterion` described by the value part.
    ///
    /// Option labels are accepted in place of option values.
    pub fn selection(&self, criterion: &Criterion) -> Result<Selection, CriterionArgError> {
        let value = self.value.as_deref().map(str::trim).filter(|value| !value.is_empty());
        match (criterion.kind(), value) {
            (CriterionKind::Boolean { .. }, None) => Ok(Selection::None),
            (CriterionKind::Boolean { .. }, Some(_)) => Err(CriterionArgError::UnexpectedValue(self.identifier.clone())),
            (_, None) => Err(CriterionArgError::MissingValue(self.identifier.clone())),
            (CriterionKind::SingleSelect { options, .. }, Some(value)) => {
                Ok(Selection::Choice(option_value(options, value)))
            }
            (CriterionKind::MultiSelect { options, .. }, Some(value)) => {
                let choices: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|choice| !choice.is_empty())
                    .map(|choice| option_value(options, choice))
                    .collect();
                if choices.is_empty() {
                    return Err(CriterionArgError::MissingValue(self.identifier.clone()));
                }
                Ok(Selection::Choices(choices))
            }
            (CriterionKind::TextInput { .. }, Some(value)) => Ok(Selection::Text(value.to_owned())),
        }
    }
}

fn option_value(options: &[SelectOption], raw: &str) -> String {
    options
        .iter()
        .find(|option| option.value == raw || option.label == raw)
        .map_or_else(|| raw.to_owned(), |option| option.value.clone())
}

/// Build a criteria list from command-line arguments.
///
/// Rows without an explicit combinator get the configured one for their position.
pub fn build_list(args: &[CriterionArg], catalog: &CriteriaCatalog, editor: &EditorConfig) -> Result<CriteriaList> {
    let mut list = CriteriaList::new();
    for arg in args {
        let criterion = catalog
            .get(&arg.identifier)
            .ok_or_else(|| CriterionArgError::UnknownCriterion(arg.identifier.clone()))?;
        let selection = arg.selection(&criterion)?;
        let combinator = arg
            .combinator
            .unwrap_or_else(|| editor.combinator_for_new_row(list.len()));
        list.add_criterion_with(criterion, selection, combinator)
            .with_context(|| format!("cannot add criterion `{}`", arg.identifier))?;
    }
    Ok(list)
}
