#![allow(missing_docs)]

use std::sync::Arc;

use tasksift_core::drag::{DragState, uniform_layout};
use tasksift_core::{
    Combinator, CriteriaCatalog, CriteriaList, Criterion, InstanceId, Selection, SqlPredicate, TaskCounter,
};
use time::OffsetDateTime;
use time::macros::datetime;

const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

fn catalog() -> CriteriaCatalog {
    CriteriaCatalog::builtin(&["work".to_owned(), "home".to_owned()], &["inbox".to_owned()])
        .unwrap_or_else(|err| panic!("catalog: {err}"))
}

fn get(catalog: &CriteriaCatalog, identifier: &str) -> Arc<Criterion> {
    catalog
        .get(identifier)
        .unwrap_or_else(|| panic!("missing criterion {identifier}"))
}

fn assert_universe_first(list: &CriteriaList) {
    let universe_rows = list
        .rows()
        .iter()
        .filter(|row| row.combinator == Combinator::Universe)
        .count();
    assert_eq!(universe_rows, 1);
    assert_eq!(list.rows()[0].combinator, Combinator::Universe);
}

/// Counts derived from the SQL length so every row gets a distinct, stable value.
struct LengthCounter;

impl TaskCounter for LengthCounter {
    type Error = std::convert::Infallible;

    fn count(&self, predicate: &SqlPredicate) -> Result<u64, Self::Error> {
        Ok(u64::try_from(predicate.sql().len() % 97).unwrap_or_default())
    }
}

#[test]
fn universe_survives_any_edit_sequence() {
    let catalog = catalog();
    let mut list = CriteriaList::new();
    let criteria = ["completed", "recurring", "subtask", "no_due_date"];
    for step in 0..40_usize {
        let criterion = get(&catalog, criteria[step % criteria.len()]);
        match step % 5 {
            0 | 1 => {
                let _ = list.add_criterion(criterion, Selection::None);
            }
            2 => {
                let _ = list.move_to(step % list.len(), (step * 7) % list.len());
            }
            3 => {
                let _ = list.remove_at(step % list.len());
            }
            _ => {
                let _ = list.set_combinator(step % list.len(), Combinator::Add);
            }
        }
        assert_universe_first(&list);
    }
    let _ = list.remove_at(0);
    let _ = list.move_to(0, 1);
    assert_universe_first(&list);
}

#[test]
fn counts_chain_after_recompute() {
    let catalog = catalog();
    let mut list = CriteriaList::new();
    list.add_criterion(get(&catalog, "tag_is"), Selection::Choice("work".into()))
        .unwrap_or_else(|err| panic!("{err}"));
    list.add_criterion_with(
        get(&catalog, "title"),
        Selection::Text("report".into()),
        Combinator::Add,
    )
    .unwrap_or_else(|err| panic!("{err}"));
    list.add_criterion_with(get(&catalog, "completed"), Selection::None, Combinator::Subtract)
        .unwrap_or_else(|err| panic!("{err}"));

    list.recompute(&LengthCounter, NOW)
        .unwrap_or_else(|never| match never {});

    let rows = list.rows();
    let max = rows.iter().map(|row| row.counts.end).max().unwrap_or_default();
    assert_eq!(rows[0].counts.start, 0);
    for pair in rows.windows(2) {
        assert_eq!(pair[1].counts.start, pair[0].counts.end);
    }
    assert!(rows.iter().all(|row| row.counts.max == max));
}

#[test]
fn persisted_filter_round_trips_through_edits() {
    let catalog = catalog();
    let mut list = CriteriaList::new();
    list.add_criterion(get(&catalog, "importance"), Selection::Choice("1".into()))
        .unwrap_or_else(|err| panic!("{err}"));
    list.add_criterion_with(
        get(&catalog, "tag_any"),
        Selection::Choices(vec!["work".into(), "home".into()]),
        Combinator::Add,
    )
    .unwrap_or_else(|err| panic!("{err}"));
    list.add_criterion_with(
        get(&catalog, "description"),
        Selection::Text("a|b,c".into()),
        Combinator::Subtract,
    )
    .unwrap_or_else(|err| panic!("{err}"));
    list.move_to(3, 1).unwrap_or_else(|err| panic!("{err}"));

    let text = list.serialize();
    let restored = CriteriaList::deserialize(&text, &catalog);
    assert_eq!(restored.serialize(), text);
    assert_eq!(restored.to_sql(NOW), list.to_sql(NOW));
}

#[test]
fn drag_swaps_feed_the_list() {
    let catalog = catalog();
    let mut list = CriteriaList::new();
    for identifier in ["completed", "recurring", "subtask", "hidden"] {
        list.add_criterion(get(&catalog, identifier), Selection::None)
            .unwrap_or_else(|err| panic!("{err}"));
    }
    let keys: Vec<InstanceId> = list.rows().iter().map(|row| row.id).collect();
    let layout = uniform_layout(&keys, 0.0, 2.0);

    let state = DragState::Idle.start(5.0, &layout);
    assert_eq!(state.dragged_key(), Some(keys[2]));

    let (state, swap) = state.drag(1.3, &layout);
    let swap = swap.unwrap_or_else(|| panic!("expected a swap"));
    assert_eq!((swap.from, swap.to), (2, 3));
    assert_eq!(state.tracked_key(), Some(keys[3]));

    list.move_to(swap.from, swap.to).unwrap_or_else(|err| panic!("{err}"));
    let reordered: Vec<InstanceId> = list.rows().iter().map(|row| row.id).collect();
    assert_eq!(reordered, vec![keys[0], keys[1], keys[3], keys[2], keys[4]]);

    // dragging into the universe row is refused by the list and not re-emitted
    let layout = uniform_layout(&reordered, 0.0, 2.0);
    let state = state.release().start(3.0, &layout);
    let (state, swap) = state.drag(-1.5, &layout);
    let swap = swap.unwrap_or_else(|| panic!("expected a swap"));
    assert!(list.move_to(swap.from, swap.to).is_err());
    let (_, again) = state.drag(-0.5, &layout);
    assert_eq!(again, None);
}
