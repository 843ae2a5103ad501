//! SQL fragments with positional bind parameters.
//!
//! Predicates are built with `?` placeholders and an ordered parameter list so
//! the store can bind values instead of splicing them. [`SqlPredicate::render_inline`]
//! produces the equivalent literal SQL (values passed through [`sanitize`]) for
//! display and persistence.

use std::fmt::{self, Write as _};

use time::{Duration, OffsetDateTime, macros::time};

use crate::instance::Combinator;

/// Predicate selecting tasks that are neither completed, deleted nor hidden.
///
/// The single placeholder binds to "now" in epoch milliseconds.
pub const ACTIVE_AND_VISIBLE: &str =
    "tasks.completed = 0 AND tasks.deleted = 0 AND tasks.hide_until <= ?";

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlValue {
    /// SQL `NULL`; never matches a comparison.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
}

impl SqlValue {
    /// Render the value as a SQL literal safe to embed in a statement.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_owned(),
            Self::Integer(value) => value.to_string(),
            Self::Text(text) => sanitize(text),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

/// Quote a raw user value as a SQL string literal.
///
/// Single quotes are doubled and NUL characters dropped, so the result always
/// parses as exactly one literal no matter what the user typed.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for ch in raw.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\0' => {}
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Resolve a select-option value into a bind parameter.
///
/// Date tokens (`NOW`, `EOD`, `EOD+n`, `EOD-n`) become epoch milliseconds relative
/// to `now`; integers bind as integers; anything else binds as text.
#[must_use]
pub fn resolve_option_value(raw: &str, now: OffsetDateTime) -> SqlValue {
    let trimmed = raw.trim();
    if let Some(millis) = resolve_date_token(trimmed, now) {
        return SqlValue::Integer(millis);
    }
    trimmed
        .parse::<i64>()
        .map_or_else(|_| SqlValue::Text(raw.to_owned()), SqlValue::Integer)
}

fn resolve_date_token(token: &str, now: OffsetDateTime) -> Option<i64> {
    if token.eq_ignore_ascii_case("NOW") {
        return Some(epoch_millis(now));
    }
    let rest = token.strip_prefix("EOD")?;
    let days = if rest.is_empty() {
        0
    } else if let Some(n) = rest.strip_prefix('+') {
        n.parse::<i64>().ok()?
    } else if rest.starts_with('-') {
        rest.parse::<i64>().ok()?
    } else {
        return None;
    };
    let end_of_day = now.replace_time(time!(23:59:59.999)) + Duration::days(days);
    Some(epoch_millis(end_of_day))
}

/// Milliseconds since the Unix epoch, saturating outside the `i64` range.
#[must_use]
pub fn epoch_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// SQL text plus the ordered values for its `?` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlPredicate {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlPredicate {
    /// Pair SQL text with its parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// SQL text with `?` placeholders.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Substitute every placeholder with its sanitized literal.
    ///
    /// Placeholders beyond the parameter list render as `NULL`.
    #[must_use]
    pub fn render_inline(&self) -> String {
        let positions = placeholder_positions(&self.sql).unwrap_or_default();
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut last = 0;
        for (idx, pos) in positions.into_iter().enumerate() {
            out.push_str(&self.sql[last..pos]);
            let literal = self
                .params
                .get(idx)
                .map_or_else(|| SqlValue::Null.to_literal(), SqlValue::to_literal);
            out.push_str(&literal);
            last = pos + 1;
        }
        out.push_str(&self.sql[last..]);
        out
    }
}

/// Error raised while scanning SQL text for placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// A quoted literal or identifier was never closed.
    #[error("unterminated quoted literal")]
    UnterminatedLiteral,
}

/// Byte offsets of `?` placeholders outside quoted literals and identifiers.
///
/// # Errors
/// Returns [`ScanError::UnterminatedLiteral`] when a quote is left open.
pub fn placeholder_positions(sql: &str) -> Result<Vec<usize>, ScanError> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    for (pos, ch) in sql.char_indices() {
        match (quote, ch) {
            // A doubled quote closes and immediately reopens, which nets out.
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '?') => positions.push(pos),
            (None, _) => {}
        }
    }
    if quote.is_some() {
        return Err(ScanError::UnterminatedLiteral);
    }
    Ok(positions)
}

/// Left-to-right accumulator for a criteria list's WHERE clause.
///
/// Each row is appended with its combinator's joiner. Before an AND / AND NOT
/// is appended to a predicate containing a top-level OR, the accumulated text is
/// parenthesised so rows always apply to the running result.
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    sql: String,
    params: Vec<SqlValue>,
    top_level_or: bool,
}

impl PredicateBuilder {
    /// Start an empty predicate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row's fragment.
    pub fn push(&mut self, combinator: Combinator, fragment: &SqlPredicate) {
        match combinator {
            Combinator::Universe => {}
            Combinator::Add => {
                self.sql.push_str(combinator.sql_joiner());
                self.top_level_or = true;
            }
            Combinator::Intersect | Combinator::Subtract => {
                if self.top_level_or {
                    self.sql = format!("({})", self.sql);
                    self.top_level_or = false;
                }
                self.sql.push_str(combinator.sql_joiner());
            }
        }
        self.sql.push_str(fragment.sql());
        self.params.extend(fragment.params().iter().cloned());
    }

    /// Snapshot the predicate accumulated so far.
    #[must_use]
    pub fn build(&self) -> SqlPredicate {
        SqlPredicate::new(self.sql.clone(), self.params.clone())
    }
}

/// Predicate for the universe row evaluated at `now`.
#[must_use]
pub fn active_and_visible(now: OffsetDateTime) -> SqlPredicate {
    SqlPredicate::new(ACTIVE_AND_VISIBLE, vec![SqlValue::Integer(epoch_millis(now))])
}

/// Wrap a criterion sub-select as a membership test on the task id.
#[must_use]
pub fn task_id_in(subselect: &SqlPredicate) -> SqlPredicate {
    let mut sql = String::with_capacity(subselect.sql().len() + 16);
    let _ = write!(sql, "tasks._id IN ({})", subselect.sql());
    SqlPredicate::new(sql, subselect.params().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn sanitize_doubles_single_quotes() {
        assert_eq!(sanitize("O'Brien"), "'O''Brien'");
        assert_eq!(sanitize("'; DROP TABLE tasks; --"), "'''; DROP TABLE tasks; --'");
        assert_eq!(sanitize("nul\0byte"), "'nulbyte'");
    }

    #[test]
    fn placeholders_inside_literals_are_ignored() {
        let positions = placeholder_positions("a LIKE '%?%' || ? AND \"q?\" = ?")
            .unwrap_or_else(|err| panic!("scan: {err}"));
        assert_eq!(positions.len(), 2);
    }

    #[test]
    fn unterminated_literal_is_reported() {
        assert_eq!(
            placeholder_positions("name = 'abc"),
            Err(ScanError::UnterminatedLiteral)
        );
    }

    #[test]
    fn render_inline_substitutes_in_order() {
        let predicate = SqlPredicate::new(
            "a = ? AND b = ? AND c = '?'",
            vec![SqlValue::Integer(3), SqlValue::Text("it's".into())],
        );
        assert_eq!(predicate.render_inline(), "a = 3 AND b = 'it''s' AND c = '?'");
    }

    #[test]
    fn date_tokens_resolve_against_now() {
        let now = datetime!(2025-03-10 08:30:00 UTC);
        let eod = datetime!(2025-03-10 23:59:59.999 UTC);
        assert_eq!(
            resolve_option_value("EOD", now),
            SqlValue::Integer(epoch_millis(eod))
        );
        assert_eq!(
            resolve_option_value("EOD+1", now),
            SqlValue::Integer(epoch_millis(eod + Duration::days(1)))
        );
        assert_eq!(
            resolve_option_value("EOD-1", now),
            SqlValue::Integer(epoch_millis(eod - Duration::days(1)))
        );
        assert_eq!(resolve_option_value("NOW", now), SqlValue::Integer(epoch_millis(now)));
        assert_eq!(resolve_option_value("2", now), SqlValue::Integer(2));
        assert_eq!(resolve_option_value("EODX", now), SqlValue::Text("EODX".into()));
        assert_eq!(resolve_option_value("work", now), SqlValue::Text("work".into()));
    }

    #[test]
    fn builder_groups_or_before_and() {
        let mut builder = PredicateBuilder::new();
        builder.push(Combinator::Universe, &SqlPredicate::new("U", Vec::new()));
        builder.push(Combinator::Add, &SqlPredicate::new("A", Vec::new()));
        builder.push(Combinator::Intersect, &SqlPredicate::new("B", Vec::new()));
        builder.push(Combinator::Subtract, &SqlPredicate::new("C", Vec::new()));
        assert_eq!(builder.build().sql(), "(U OR A) AND B AND NOT C");
    }

    #[test]
    fn builder_keeps_plain_and_chain_flat() {
        let mut builder = PredicateBuilder::new();
        builder.push(Combinator::Universe, &SqlPredicate::new("U", Vec::new()));
        builder.push(Combinator::Intersect, &SqlPredicate::new("A", Vec::new()));
        assert_eq!(builder.build().sql(), "U AND A");
    }
}
