//! Line-oriented persisted form of a criteria list.
//!
//! One record per user row, `<combinator code>|<identifier>|<value>`, joined by
//! newlines. The universe row is implicit. Values escape `\`, `|`, newlines,
//! carriage returns and `,` so records and multi-select choices split cleanly.

use tracing::warn;

use crate::{
    catalog::CriteriaCatalog,
    criteria::{CriteriaError, CriteriaList, check_selection},
    criterion::CriterionKind,
    instance::{Combinator, CriterionInstance, Selection},
};

const FIELD_SEPARATOR: char = '|';
const CHOICE_SEPARATOR: char = ',';

/// Errors raised by [`CriteriaList::try_deserialize`]. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A record lacks one of its three fields.
    #[error("line {line}: expected `combinator|identifier|value`")]
    MissingField {
        /// Offending line.
        line: usize,
    },
    /// The combinator code is not 0, 1 or 2.
    #[error("line {line}: unknown combinator `{code}`")]
    UnknownCombinator {
        /// Offending line.
        line: usize,
        /// Code as written.
        code: String,
    },
    /// A record names the universe combinator, which is implicit.
    #[error("line {line}: the universe row cannot be stored explicitly")]
    UniverseRecord {
        /// Offending line.
        line: usize,
    },
    /// No criterion with this identifier is registered.
    #[error("line {line}: unknown criterion `{identifier}`")]
    UnknownCriterion {
        /// Offending line.
        line: usize,
        /// Identifier as written.
        identifier: String,
    },
    /// A value contains an invalid escape sequence.
    #[error("line {line}: invalid escape sequence in value")]
    BadEscape {
        /// Offending line.
        line: usize,
    },
    /// The stored value does not fit the criterion kind.
    #[error("line {line}: {source}")]
    Selection {
        /// Offending line.
        line: usize,
        /// Underlying mismatch.
        #[source]
        source: CriteriaError,
    },
}

impl CriteriaList {
    /// Persisted form of the user rows.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.rows()
            .iter()
            .filter(|row| row.combinator != Combinator::Universe)
            .map(encode_row)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse a persisted list, falling back to the universe row alone when the
    /// text is malformed.
    #[must_use]
    pub fn deserialize(text: &str, catalog: &CriteriaCatalog) -> Self {
        Self::try_deserialize(text, catalog).unwrap_or_else(|err| {
            warn!(error = %err, "ignoring malformed criteria; starting from all active tasks");
            Self::new()
        })
    }

    /// Parse a persisted list.
    ///
    /// Empty text yields the universe row alone.
    ///
    /// # Errors
    /// Returns the first malformed record.
    pub fn try_deserialize(text: &str, catalog: &CriteriaCatalog) -> Result<Self, CodecError> {
        let mut rows = Vec::new();
        for (idx, record) in text.lines().enumerate() {
            if record.trim().is_empty() {
                continue;
            }
            rows.push(decode_row(idx + 1, record, catalog)?);
        }
        Ok(Self::from_user_rows(rows))
    }
}

fn encode_row(row: &CriterionInstance) -> String {
    let value = match &row.selection {
        Selection::None => String::new(),
        Selection::Text(text) | Selection::Choice(text) => escape(text),
        Selection::Choices(values) => values
            .iter()
            .map(String::as_str)
            .map(escape)
            .collect::<Vec<_>>()
            .join(","),
    };
    format!(
        "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{value}",
        row.combinator.code(),
        row.criterion.identifier()
    )
}

fn decode_row(line: usize, record: &str, catalog: &CriteriaCatalog) -> Result<CriterionInstance, CodecError> {
    let mut fields = record.splitn(3, FIELD_SEPARATOR);
    let (Some(code), Some(identifier), Some(raw)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(CodecError::MissingField { line });
    };
    let combinator = code
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(Combinator::from_code)
        .ok_or_else(|| CodecError::UnknownCombinator {
            line,
            code: code.to_owned(),
        })?;
    if combinator == Combinator::Universe {
        return Err(CodecError::UniverseRecord { line });
    }
    let criterion = catalog
        .get(identifier)
        .ok_or_else(|| CodecError::UnknownCriterion {
            line,
            identifier: identifier.to_owned(),
        })?;
    let selection = match criterion.kind() {
        CriterionKind::Boolean { .. } if raw.is_empty() => Selection::None,
        CriterionKind::Boolean { .. } | CriterionKind::TextInput { .. } => {
            Selection::Text(unescape(raw, line)?)
        }
        CriterionKind::SingleSelect { .. } => Selection::Choice(unescape(raw, line)?),
        CriterionKind::MultiSelect { .. } => Selection::Choices(
            raw.split(CHOICE_SEPARATOR)
                .map(|value| unescape(value, line))
                .collect::<Result<_, _>>()?,
        ),
    };
    check_selection(&criterion, &selection).map_err(|source| CodecError::Selection { line, source })?;
    Ok(CriterionInstance::new(criterion, combinator, selection))
}

/// Escape a value for one field of a record.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\p"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ',' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str, line: usize) -> Result<String, CodecError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let decoded = match chars.next() {
            Some('\\') => '\\',
            Some('p') => '|',
            Some('n') => '\n',
            Some('r') => '\r',
            Some('c') => ',',
            _ => return Err(CodecError::BadEscape { line }),
        };
        out.push(decoded);
    }
    Ok(out)
}
