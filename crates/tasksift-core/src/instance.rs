//! Criterion instances: one row of a criteria list.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{criterion::Criterion, id::InstanceId};

/// Set operation joining a row to the running result of the rows above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Union (`OR`).
    #[serde(rename = "or")]
    Add,
    /// Difference (`AND NOT`).
    #[serde(rename = "not")]
    Subtract,
    /// Intersection (`AND`).
    #[serde(rename = "and")]
    Intersect,
    /// Starting set; only valid on the first row.
    Universe,
}

impl Combinator {
    /// Numeric code used in the persisted record form.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Subtract => 1,
            Self::Intersect => 2,
            Self::Universe => 3,
        }
    }

    /// Inverse of [`Self::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::Subtract),
            2 => Some(Self::Intersect),
            3 => Some(Self::Universe),
            _ => None,
        }
    }

    /// Text placed between the running predicate and this row's fragment.
    #[must_use]
    pub const fn sql_joiner(self) -> &'static str {
        match self {
            Self::Add => " OR ",
            Self::Subtract => " AND NOT ",
            Self::Intersect => " AND ",
            Self::Universe => "",
        }
    }

    /// Short keyword shown in lists and accepted on the command line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Add => "or",
            Self::Subtract => "not",
            Self::Intersect => "and",
            Self::Universe => "all",
        }
    }

    /// Whether applying this row can only shrink the running set.
    ///
    /// Rows with such combinators carry their values into new tasks.
    #[must_use]
    pub const fn narrows(self) -> bool {
        matches!(self, Self::Intersect)
    }

    /// Next user-selectable combinator, cycling AND → OR → NOT → AND.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Intersect => Self::Add,
            Self::Add => Self::Subtract,
            Self::Subtract | Self::Universe => Self::Intersect,
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when parsing an unknown combinator keyword.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown combinator `{0}` (expected and, or, not)")]
pub struct ParseCombinatorError(String);

impl FromStr for Combinator {
    type Err = ParseCombinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" | "intersect" => Ok(Self::Intersect),
            "or" | "add" => Ok(Self::Add),
            "not" | "and-not" | "subtract" => Ok(Self::Subtract),
            _ => Err(ParseCombinatorError(s.to_owned())),
        }
    }
}

/// Value chosen for a criterion instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Selection {
    /// Boolean criteria take no value.
    #[default]
    None,
    /// Free text typed by the user.
    Text(String),
    /// One option value.
    Choice(String),
    /// Several option values, in the order picked.
    Choices(Vec<String>),
}

impl Selection {
    /// Text form of the selection; multi-select values are joined by `, `.
    #[must_use]
    pub fn selected_text(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Text(text) | Self::Choice(text) => Some(text.clone()),
            Self::Choices(values) => Some(values.join(", ")),
        }
    }
}

/// Task counts computed for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowCounts {
    /// Tasks matched by the rows above.
    pub start: u64,
    /// Tasks matched by the rows up to and including this one.
    pub end: u64,
    /// Largest `end` in the whole list.
    pub max: u64,
}

/// One row: a criterion plus combinator, chosen value and counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionInstance {
    /// Identity, stable across moves.
    pub id: InstanceId,
    /// Definition this row applies.
    pub criterion: Arc<Criterion>,
    /// How this row joins the rows above.
    pub combinator: Combinator,
    /// Value chosen by the user.
    pub selection: Selection,
    /// Last computed counts.
    pub counts: RowCounts,
}

impl CriterionInstance {
    /// New row with a fresh id and zero counts.
    #[must_use]
    pub fn new(criterion: Arc<Criterion>, combinator: Combinator, selection: Selection) -> Self {
        Self {
            id: InstanceId::new(),
            criterion,
            combinator,
            selection,
            counts: RowCounts::default(),
        }
    }

    /// Index of the selected option for single-select rows.
    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        let Selection::Choice(value) = &self.selection else {
            return None;
        };
        self.criterion
            .options()
            .iter()
            .position(|option| &option.value == value)
    }

    /// Human summary such as `and Tag is: work`.
    #[must_use]
    pub fn describe(&self) -> String {
        let title = self.criterion.title();
        let value = match &self.selection {
            Selection::None => None,
            Selection::Text(text) => Some(format!("\"{text}\"")),
            Selection::Choice(value) => {
                Some(self.criterion.option_label(value).unwrap_or(value).to_owned())
            }
            Selection::Choices(values) => Some(
                values
                    .iter()
                    .map(|value| self.criterion.option_label(value).unwrap_or(value))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        };
        match (self.combinator, value) {
            (Combinator::Universe, _) => title.to_owned(),
            (combinator, None) => format!("{combinator} {title}"),
            (combinator, Some(value)) => format!("{combinator} {title}: {value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::{DefaultValues, SelectOption};

    #[test]
    fn codes_round_trip() {
        for combinator in [
            Combinator::Add,
            Combinator::Subtract,
            Combinator::Intersect,
            Combinator::Universe,
        ] {
            assert_eq!(Combinator::from_code(combinator.code()), Some(combinator));
        }
        assert_eq!(Combinator::from_code(4), None);
    }

    #[test]
    fn parse_accepts_keywords() {
        assert_eq!("AND".parse::<Combinator>(), Ok(Combinator::Intersect));
        assert_eq!("or".parse::<Combinator>(), Ok(Combinator::Add));
        assert_eq!("not".parse::<Combinator>(), Ok(Combinator::Subtract));
        assert!("all".parse::<Combinator>().is_err());
    }

    #[test]
    fn next_never_yields_universe() {
        let mut combinator = Combinator::Intersect;
        for _ in 0..6 {
            combinator = combinator.next();
            assert_ne!(combinator, Combinator::Universe);
        }
    }

    #[test]
    fn describe_uses_option_labels() {
        let criterion = Criterion::single_select(
            "importance",
            "Priority",
            "SELECT 1 WHERE p <= ?",
            vec![SelectOption::new("!!", "1"), SelectOption::new("!", "2")],
            DefaultValues::new(),
        )
        .unwrap_or_else(|err| panic!("criterion: {err}"));
        let row = CriterionInstance::new(
            Arc::new(criterion),
            Combinator::Add,
            Selection::Choice("2".into()),
        );
        assert_eq!(row.describe(), "or Priority: !");
        assert_eq!(row.selected_index(), Some(1));
    }
}
