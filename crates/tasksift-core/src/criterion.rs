//! Criterion definitions: the reusable boolean tests a filter is built from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::instance::Selection;
use crate::sql::{ScanError, SqlPredicate, SqlValue, placeholder_positions, resolve_option_value};

/// Identifier reserved for the implicit universe row.
pub const UNIVERSE_IDENTIFIER: &str = "active";

/// Marker substituted by the selected value inside default task values.
pub const DEFAULT_VALUE_MARKER: &str = "$?";

/// Field defaults applied to tasks created under a filter (`field -> value`).
pub type DefaultValues = BTreeMap<String, String>;

/// Errors raised while validating a SQL template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The template contains no SQL.
    #[error("template is empty")]
    Empty,
    /// Wrong number of `?` placeholders for the criterion kind.
    #[error("expected {expected} placeholder(s), found {found}")]
    PlaceholderCount {
        /// Placeholders required by the kind.
        expected: usize,
        /// Placeholders present in the template.
        found: usize,
    },
    /// The template could not be scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Errors raised while constructing a criterion definition.
///
/// These describe broken configuration, not user input: a criterion that fails
/// here cannot take part in any filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriterionError {
    /// The identifier is blank or contains reserved characters.
    #[error("invalid criterion identifier `{0}`")]
    InvalidIdentifier(String),
    /// The identifier collides with the universe row.
    #[error("criterion identifier `{0}` is reserved")]
    ReservedIdentifier(String),
    /// The SQL template is malformed.
    #[error("criterion `{identifier}` has a malformed SQL template: {source}")]
    Template {
        /// Criterion identifier.
        identifier: String,
        /// Underlying template problem.
        #[source]
        source: TemplateError,
    },
    /// Two options share the same value.
    #[error("criterion `{identifier}` repeats option value `{value}`")]
    DuplicateOption {
        /// Criterion identifier.
        identifier: String,
        /// Repeated value.
        value: String,
    },
    /// Another criterion with this identifier is already registered.
    #[error("criterion `{0}` is defined more than once")]
    Duplicate(String),
}

/// SQL sub-select template, validated for its placeholder count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    sql: String,
    placeholders: usize,
}

impl SqlTemplate {
    /// Template taking exactly one `?` placeholder.
    ///
    /// # Errors
    /// Returns an error when the template is blank, has an unterminated literal,
    /// or does not contain exactly one placeholder.
    pub fn parameterized(sql: impl Into<String>) -> Result<Self, TemplateError> {
        Self::with_placeholders(sql.into(), 1)
    }

    /// Template without placeholders.
    ///
    /// # Errors
    /// Returns an error when the template is blank, has an unterminated literal,
    /// or contains a placeholder.
    pub fn fixed(sql: impl Into<String>) -> Result<Self, TemplateError> {
        Self::with_placeholders(sql.into(), 0)
    }

    fn with_placeholders(sql: String, expected: usize) -> Result<Self, TemplateError> {
        if sql.trim().is_empty() {
            return Err(TemplateError::Empty);
        }
        let found = placeholder_positions(&sql)?.len();
        if found != expected {
            return Err(TemplateError::PlaceholderCount { expected, found });
        }
        Ok(Self {
            sql,
            placeholders: expected,
        })
    }

    /// Raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Whether the template takes a value.
    #[must_use]
    pub const fn is_parameterized(&self) -> bool {
        self.placeholders > 0
    }

    /// Bind values to the placeholder.
    ///
    /// A single value replaces the placeholder directly; several values expand it
    /// into a comma-separated bind list. Fixed templates ignore `values`.
    #[must_use]
    pub fn bind(&self, values: Vec<SqlValue>) -> SqlPredicate {
        if !self.is_parameterized() {
            return SqlPredicate::new(self.sql.clone(), Vec::new());
        }
        if values.len() <= 1 {
            let values = if values.is_empty() { vec![SqlValue::Null] } else { values };
            return SqlPredicate::new(self.sql.clone(), values);
        }
        let expanded = vec!["?"; values.len()].join(", ");
        let sql = placeholder_positions(&self.sql)
            .ok()
            .and_then(|positions| positions.first().copied())
            .map_or_else(
                || self.sql.clone(),
                |pos| format!("{}{expanded}{}", &self.sql[..pos], &self.sql[pos + 1..]),
            );
        SqlPredicate::new(sql, values)
    }
}

/// How a select option's value is bound into its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionValueKind {
    /// Bound as the text given.
    #[default]
    Text,
    /// Date token (`NOW`, `EOD`, `EOD+n`, `EOD-n`) or integer, resolved at bind time.
    Resolved,
}

/// One entry of a select criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Label shown to the user.
    pub label: String,
    /// Value bound into the template.
    pub value: String,
    /// Whether `value` is literal text or a token.
    #[serde(default)]
    pub value_kind: OptionValueKind,
}

impl SelectOption {
    /// Build an option bound as literal text.
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            value_kind: OptionValueKind::Text,
        }
    }

    /// Option whose label and value are the same text.
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(value.clone(), value)
    }

    /// Option whose value is a date token or an integer.
    pub fn resolved(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value_kind: OptionValueKind::Resolved,
            ..Self::new(label, value)
        }
    }
}

/// Bind parameter for a chosen option value.
///
/// Values outside `options` bind as text.
fn option_value(options: &[SelectOption], value: &str, now: OffsetDateTime) -> SqlValue {
    match options.iter().find(|option| option.value == value) {
        Some(option) if option.value_kind == OptionValueKind::Resolved => resolve_option_value(value, now),
        _ => SqlValue::Text(value.to_owned()),
    }
}

/// Shape of a criterion and the data that shape needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriterionKind {
    /// Fixed test without a value.
    Boolean {
        /// Sub-select yielding matching task ids.
        sql: SqlTemplate,
    },
    /// One value picked from a list.
    SingleSelect {
        /// Sub-select with one placeholder.
        sql: SqlTemplate,
        /// Choices offered to the user.
        options: Vec<SelectOption>,
        /// Defaults for new tasks.
        defaults: DefaultValues,
    },
    /// One or more values picked from a list.
    MultiSelect {
        /// Sub-select whose placeholder expands to a bind list.
        sql: SqlTemplate,
        /// Choices offered to the user.
        options: Vec<SelectOption>,
        /// Defaults for new tasks.
        defaults: DefaultValues,
    },
    /// Free text typed by the user.
    TextInput {
        /// Sub-select with one placeholder.
        sql: SqlTemplate,
        /// Dialog prompt.
        prompt: String,
        /// Input hint.
        hint: String,
    },
}

/// Which value picker a criterion needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Picker<'a> {
    /// No value; the criterion can be added directly.
    None,
    /// Pick exactly one option.
    Single(&'a [SelectOption]),
    /// Pick one or more options.
    Multi(&'a [SelectOption]),
    /// Type free text.
    Text {
        /// Dialog prompt.
        prompt: &'a str,
        /// Input hint.
        hint: &'a str,
    },
}

/// Named, reusable boolean test over tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    identifier: String,
    title: String,
    kind: CriterionKind,
}

impl Criterion {
    /// Criterion without a value.
    ///
    /// # Errors
    /// Returns an error when the identifier is invalid or the template has placeholders.
    pub fn boolean(
        identifier: impl Into<String>,
        title: impl Into<String>,
        sql: &str,
    ) -> Result<Self, CriterionError> {
        let identifier = checked_identifier(identifier.into())?;
        let sql = template(&identifier, SqlTemplate::fixed(sql))?;
        Ok(Self {
            identifier,
            title: title.into(),
            kind: CriterionKind::Boolean { sql },
        })
    }

    /// Criterion taking one option from `options`.
    ///
    /// # Errors
    /// Returns an error for an invalid identifier, a malformed template, or duplicate option values.
    pub fn single_select(
        identifier: impl Into<String>,
        title: impl Into<String>,
        sql: &str,
        options: Vec<SelectOption>,
        defaults: DefaultValues,
    ) -> Result<Self, CriterionError> {
        let identifier = checked_identifier(identifier.into())?;
        let sql = template(&identifier, SqlTemplate::parameterized(sql))?;
        check_options(&identifier, &options)?;
        Ok(Self {
            identifier,
            title: title.into(),
            kind: CriterionKind::SingleSelect {
                sql,
                options,
                defaults,
            },
        })
    }

    /// Criterion taking any non-empty subset of `options`.
    ///
    /// # Errors
    /// Returns an error for an invalid identifier, a malformed template, or duplicate option values.
    pub fn multi_select(
        identifier: impl Into<String>,
        title: impl Into<String>,
        sql: &str,
        options: Vec<SelectOption>,
        defaults: DefaultValues,
    ) -> Result<Self, CriterionError> {
        let identifier = checked_identifier(identifier.into())?;
        let sql = template(&identifier, SqlTemplate::parameterized(sql))?;
        check_options(&identifier, &options)?;
        Ok(Self {
            identifier,
            title: title.into(),
            kind: CriterionKind::MultiSelect {
                sql,
                options,
                defaults,
            },
        })
    }

    /// Criterion taking free text.
    ///
    /// # Errors
    /// Returns an error when the identifier is invalid or the template lacks its placeholder.
    pub fn text_input(
        identifier: impl Into<String>,
        title: impl Into<String>,
        sql: &str,
        prompt: impl Into<String>,
        hint: impl Into<String>,
    ) -> Result<Self, CriterionError> {
        let identifier = checked_identifier(identifier.into())?;
        let sql = template(&identifier, SqlTemplate::parameterized(sql))?;
        Ok(Self {
            identifier,
            title: title.into(),
            kind: CriterionKind::TextInput {
                sql,
                prompt: prompt.into(),
                hint: hint.into(),
            },
        })
    }

    /// Definition backing the universe row. Its predicate is supplied by the
    /// list builder, so the template only documents the base table.
    pub(crate) fn universe() -> Self {
        Self {
            identifier: UNIVERSE_IDENTIFIER.to_owned(),
            title: "Active and visible tasks".to_owned(),
            kind: CriterionKind::Boolean {
                sql: SqlTemplate {
                    sql: "SELECT tasks._id FROM tasks".to_owned(),
                    placeholders: 0,
                },
            },
        }
    }

    /// Stable type name used in the persisted form.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Human label.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Kind-specific data.
    #[must_use]
    pub const fn kind(&self) -> &CriterionKind {
        &self.kind
    }

    /// SQL template of any kind.
    #[must_use]
    pub const fn template(&self) -> &SqlTemplate {
        match &self.kind {
            CriterionKind::Boolean { sql }
            | CriterionKind::SingleSelect { sql, .. }
            | CriterionKind::MultiSelect { sql, .. }
            | CriterionKind::TextInput { sql, .. } => sql,
        }
    }

    /// Options offered by select kinds (empty otherwise).
    #[must_use]
    pub fn options(&self) -> &[SelectOption] {
        match &self.kind {
            CriterionKind::SingleSelect { options, .. } | CriterionKind::MultiSelect { options, .. } => {
                options
            }
            CriterionKind::Boolean { .. } | CriterionKind::TextInput { .. } => &[],
        }
    }

    /// Picker the UI should open before adding this criterion.
    #[must_use]
    pub fn picker(&self) -> Picker<'_> {
        match &self.kind {
            CriterionKind::Boolean { .. } => Picker::None,
            CriterionKind::SingleSelect { options, .. } => Picker::Single(options),
            CriterionKind::MultiSelect { options, .. } => Picker::Multi(options),
            CriterionKind::TextInput { prompt, hint, .. } => Picker::Text { prompt, hint },
        }
    }

    /// Human name of the selection shape this criterion expects.
    #[must_use]
    pub const fn expected_selection(&self) -> &'static str {
        match self.kind {
            CriterionKind::Boolean { .. } => "no",
            CriterionKind::SingleSelect { .. } => "a single choice",
            CriterionKind::MultiSelect { .. } => "one or more choices",
            CriterionKind::TextInput { .. } => "a text",
        }
    }

    /// Whether `selection` has the shape this criterion takes.
    #[must_use]
    pub fn accepts(&self, selection: &Selection) -> bool {
        match (&self.kind, selection) {
            (CriterionKind::Boolean { .. }, Selection::None)
            | (CriterionKind::TextInput { .. }, Selection::Text(_)) => true,
            (CriterionKind::SingleSelect { .. }, Selection::Choice(value)) => !value.is_empty(),
            (CriterionKind::MultiSelect { .. }, Selection::Choices(values)) => {
                !values.is_empty() && values.iter().all(|value| !value.is_empty())
            }
            _ => false,
        }
    }

    /// Sub-select for this criterion with the selection bound.
    ///
    /// A selection of the wrong shape binds `NULL`, which matches nothing.
    #[must_use]
    pub fn bind(&self, selection: &Selection, now: OffsetDateTime) -> SqlPredicate {
        let values = match (&self.kind, selection) {
            (CriterionKind::Boolean { .. }, _) => Vec::new(),
            (CriterionKind::SingleSelect { options, .. }, Selection::Choice(value)) => {
                vec![option_value(options, value, now)]
            }
            (CriterionKind::MultiSelect { options, .. }, Selection::Choices(values)) => values
                .iter()
                .map(|value| option_value(options, value, now))
                .collect(),
            (CriterionKind::TextInput { .. }, Selection::Text(text)) => vec![SqlValue::Text(text.clone())],
            _ => vec![SqlValue::Null],
        };
        self.template().bind(values)
    }

    /// Task defaults implied by `selection`, with `$?` replaced by the selected value.
    #[must_use]
    pub fn defaults_for(&self, selection: &Selection) -> DefaultValues {
        let defaults = match &self.kind {
            CriterionKind::SingleSelect { defaults, .. } | CriterionKind::MultiSelect { defaults, .. } => {
                defaults
            }
            CriterionKind::Boolean { .. } | CriterionKind::TextInput { .. } => return DefaultValues::new(),
        };
        let Some(value) = selection.selected_text() else {
            return DefaultValues::new();
        };
        defaults
            .iter()
            .map(|(key, template)| {
                (
                    key.replace(DEFAULT_VALUE_MARKER, &value),
                    template.replace(DEFAULT_VALUE_MARKER, &value),
                )
            })
            .collect()
    }

    /// Label of the option with `value`, if any.
    #[must_use]
    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options()
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.label.as_str())
    }
}

fn checked_identifier(identifier: String) -> Result<String, CriterionError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty()
        || trimmed != identifier
        || identifier.chars().any(|c| matches!(c, '|' | '\n' | '\r' | '\\' | ','))
    {
        return Err(CriterionError::InvalidIdentifier(identifier));
    }
    if identifier == UNIVERSE_IDENTIFIER {
        return Err(CriterionError::ReservedIdentifier(identifier));
    }
    Ok(identifier)
}

fn template(identifier: &str, result: Result<SqlTemplate, TemplateError>) -> Result<SqlTemplate, CriterionError> {
    result.map_err(|source| CriterionError::Template {
        identifier: identifier.to_owned(),
        source,
    })
}

fn check_options(identifier: &str, options: &[SelectOption]) -> Result<(), CriterionError> {
    let mut seen = std::collections::BTreeSet::new();
    for option in options {
        if !seen.insert(option.value.as_str()) {
            return Err(CriterionError::DuplicateOption {
                identifier: identifier.to_owned(),
                value: option.value.clone(),
            });
        }
    }
    Ok(())
}
