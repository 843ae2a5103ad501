//! Pre-fill new tasks from a filter's default values.

use tasksift_core::{DefaultValues, SqlValue};
use tasksift_core::sql::resolve_option_value;
use tasksift_store_sqlite::NewTask;
use time::OffsetDateTime;
use tracing::warn;

const LOWEST_IMPORTANCE: u8 = 3;

/// Copy `values` onto `task`, resolving date tokens against `now`.
///
/// Unknown fields and values that do not fit a field are skipped with a warning.
pub fn apply_defaults(task: &mut NewTask, values: &DefaultValues, now: OffsetDateTime) {
    for (field, raw) in values {
        let applied = match field.as_str() {
            "importance" => match integer(raw, now).and_then(|value| u8::try_from(value).ok()) {
                Some(value) => {
                    task.importance = Some(value.min(LOWEST_IMPORTANCE));
                    true
                }
                None => false,
            },
            "due_date" => set_instant(&mut task.due_date, raw, now),
            "hide_until" => set_instant(&mut task.hide_until, raw, now),
            "parent" => match integer(raw, now) {
                Some(id) => {
                    task.parent = Some(id);
                    true
                }
                None => false,
            },
            "list" => {
                task.list = Some(raw.clone());
                true
            }
            "tag" | "tags" => {
                for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
                    if !task.tags.iter().any(|existing| existing == tag) {
                        task.tags.push(tag.to_owned());
                    }
                }
                true
            }
            _ => {
                warn!(field = %field, "Ignoring default for unknown task field");
                continue;
            }
        };
        if !applied {
            warn!(field = %field, value = %raw, "Ignoring default that does not fit the field");
        }
    }
}

fn set_instant(slot: &mut Option<OffsetDateTime>, raw: &str, now: OffsetDateTime) -> bool {
    let Some(at) = integer(raw, now).and_then(|millis| {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
    }) else {
        return false;
    };
    *slot = Some(at);
    true
}

fn integer(raw: &str, now: OffsetDateTime) -> Option<i64> {
    match resolve_option_value(raw, now) {
        SqlValue::Integer(value) => Some(value),
        SqlValue::Null | SqlValue::Text(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 09:30 UTC);

    fn values(pairs: &[(&str, &str)]) -> DefaultValues {
        pairs
            .iter()
            .map(|(field, value)| ((*field).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn fills_known_fields() {
        let mut task = NewTask::titled("Write report");
        apply_defaults(
            &mut task,
            &values(&[("importance", "1"), ("due_date", "EOD+1"), ("list", "work"), ("tags", "a, b")]),
            NOW,
        );
        assert_eq!(task.importance, Some(1));
        assert_eq!(task.due_date, Some(datetime!(2025-06-02 23:59:59.999 UTC)));
        assert_eq!(task.list.as_deref(), Some("work"));
        assert_eq!(task.tags, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn skips_unknown_fields_and_bad_values() {
        let mut task = NewTask::titled("Anything");
        apply_defaults(
            &mut task,
            &values(&[("colour", "red"), ("importance", "high"), ("due_date", "soon")]),
            NOW,
        );
        assert_eq!(task, NewTask::titled("Anything"));
    }

    #[test]
    fn importance_is_capped() {
        let mut task = NewTask::titled("Low");
        apply_defaults(&mut task, &values(&[("importance", "9")]), NOW);
        assert_eq!(task.importance, Some(LOWEST_IMPORTANCE));
    }
}
