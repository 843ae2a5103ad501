use super::app::App;
use super::view::{Focus, MessageLevel, Ui};
use super::widgets::count_bar;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{Terminal, backend::TestBackend, layout::Rect};
use tasksift_app::EditorConfig;
use tasksift_core::{Combinator, CriteriaCatalog, InstanceId, RowCounts, Selection};
use tasksift_store_sqlite::{NewTask, SqliteStore};
use time::macros::datetime;
use tokio::runtime::Runtime;

fn expect_ok<T, E: std::fmt::Display>(result: Result<T, E>, ctx: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{ctx}: {err}"),
    }
}

/// Editor over three tasks: two tagged `work`, one tagged `home`.
fn ui_with_tasks() -> (Runtime, Ui) {
    let runtime = expect_ok(Runtime::new(), "runtime");
    let mut store = expect_ok(SqliteStore::open_in_memory(), "store");
    for (title, tag) in [("Plan", "work"), ("Ship", "work"), ("Garden", "home")] {
        let task = NewTask {
            tags: vec![tag.to_owned()],
            ..NewTask::titled(title)
        };
        expect_ok(store.insert_task(&task, datetime!(2025-06-01 12:00 UTC)), "insert");
    }
    let catalog = expect_ok(
        CriteriaCatalog::builtin(
            &expect_ok(store.tag_names(), "tags"),
            &expect_ok(store.list_names(), "lists"),
        ),
        "catalog",
    );
    let app = App::new(runtime.handle().clone(), store, catalog, EditorConfig::default(), None);
    let mut ui = Ui::new(app);
    ui.viewport = Rect::new(0, 0, 80, 30);
    (runtime, ui)
}

fn press(ui: &mut Ui, code: KeyCode) {
    ui.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
}

fn type_text(ui: &mut Ui, text: &str) {
    for c in text.chars() {
        press(ui, KeyCode::Char(c));
    }
}

/// Open the criterion picker and choose entry `index`.
fn pick_criterion(ui: &mut Ui, index: usize) {
    press(ui, KeyCode::Char('a'));
    for _ in 0..index {
        press(ui, KeyCode::Char('j'));
    }
    press(ui, KeyCode::Enter);
}

fn mouse(ui: &mut Ui, kind: MouseEventKind, row: u16) {
    ui.handle_mouse(MouseEvent {
        kind,
        column: 5,
        row,
        modifiers: KeyModifiers::NONE,
    });
}

fn ends(ui: &mut Ui) -> Vec<u64> {
    if let Some(failure) = ui.app.settle() {
        panic!("refresh failed: {failure}");
    }
    ui.app.list.rows().iter().map(|row| row.counts.end).collect()
}

fn ids(ui: &Ui) -> Vec<InstanceId> {
    ui.app.list.rows().iter().map(|row| row.id).collect()
}

fn catalog_index(ui: &Ui, identifier: &str) -> usize {
    ui.app
        .catalog
        .iter()
        .position(|criterion| criterion.identifier() == identifier)
        .unwrap_or_else(|| panic!("missing criterion {identifier}"))
}

#[test]
fn single_select_is_added_through_the_option_picker() {
    let (_runtime, mut ui) = ui_with_tasks();
    assert_eq!(ends(&mut ui), vec![3]);

    let index = catalog_index(&ui, "tag_is");
    pick_criterion(&mut ui, index);
    assert!(matches!(ui.focus, Focus::OptionPicker(_)));
    // Options are sorted tag names: home, work.
    press(&mut ui, KeyCode::Char('j'));
    press(&mut ui, KeyCode::Enter);

    assert!(matches!(ui.focus, Focus::Rows));
    assert_eq!(ui.selected, 1);
    assert_eq!(ui.app.list.rows()[1].selection, Selection::Choice("work".into()));
    assert_eq!(ends(&mut ui), vec![3, 2]);
}

#[test]
fn multi_select_toggles_options() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "tag_any");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Char(' '));
    press(&mut ui, KeyCode::Char('j'));
    press(&mut ui, KeyCode::Char(' '));
    press(&mut ui, KeyCode::Enter);

    assert_eq!(
        ui.app.list.rows()[1].selection,
        Selection::Choices(vec!["home".into(), "work".into()])
    );
    assert_eq!(ends(&mut ui), vec![3, 3]);
}

#[test]
fn boolean_and_text_criteria() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "completed");
    pick_criterion(&mut ui, index);
    assert!(matches!(ui.focus, Focus::Rows));
    assert_eq!(ui.app.list.rows()[1].selection, Selection::None);

    let index = catalog_index(&ui, "title");
    pick_criterion(&mut ui, index);
    assert!(matches!(ui.focus, Focus::TextInput { .. }));
    type_text(&mut ui, "Shipx");
    press(&mut ui, KeyCode::Backspace);
    press(&mut ui, KeyCode::Enter);
    assert_eq!(ui.app.list.rows()[2].selection, Selection::Text("Ship".into()));

    // Cycle the completed row to OR: nothing completed, so still 3; then title narrows to 1.
    ui.selected = 1;
    press(&mut ui, KeyCode::Char('c'));
    assert_eq!(ui.app.list.rows()[1].combinator, Combinator::Add);
    assert_eq!(ends(&mut ui), vec![3, 3, 1]);
}

#[test]
fn edit_reopens_picker_with_current_value() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "tag_is");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Char('j'));
    press(&mut ui, KeyCode::Enter);
    assert_eq!(ends(&mut ui), vec![3, 2]);

    press(&mut ui, KeyCode::Char('e'));
    assert!(matches!(&ui.focus, Focus::OptionPicker(state) if state.selected == 1 && state.target == Some(1)));
    press(&mut ui, KeyCode::Char('k'));
    press(&mut ui, KeyCode::Enter);
    assert_eq!(ui.app.rows_len(), 2);
    assert_eq!(ui.app.list.rows()[1].selection, Selection::Choice("home".into()));
    assert_eq!(ends(&mut ui), vec![3, 1]);

    let index = catalog_index(&ui, "title");
    pick_criterion(&mut ui, index);
    type_text(&mut ui, "an");
    press(&mut ui, KeyCode::Enter);
    press(&mut ui, KeyCode::Char('e'));
    assert!(matches!(&ui.focus, Focus::TextInput { buffer, .. } if buffer == "an"));
    press(&mut ui, KeyCode::Backspace);
    press(&mut ui, KeyCode::Enter);
    assert_eq!(ui.app.list.rows()[2].selection, Selection::Text("a".into()));

    let index = catalog_index(&ui, "completed");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Char('e'));
    assert!(matches!(ui.focus, Focus::Rows));
    assert!(matches!(ui.message.as_ref().map(|m| m.level), Some(MessageLevel::Error)));
    assert_eq!(ui.app.rows_len(), 4);
}

#[test]
fn escape_cancels_pickers_without_edits() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "title");
    pick_criterion(&mut ui, index);
    type_text(&mut ui, "abc");
    press(&mut ui, KeyCode::Esc);
    assert!(matches!(ui.focus, Focus::Rows));
    assert_eq!(ui.app.rows_len(), 1);
    assert!(!ui.should_quit);
}

#[test]
fn first_row_cannot_be_edited() {
    let (_runtime, mut ui) = ui_with_tasks();
    press(&mut ui, KeyCode::Char('d'));
    assert_eq!(ui.app.rows_len(), 1);
    assert!(matches!(ui.message.as_ref().map(|m| m.level), Some(MessageLevel::Error)));

    press(&mut ui, KeyCode::Char('c'));
    assert_eq!(ui.app.list.rows()[0].combinator, Combinator::Universe);
}

#[test]
fn keyboard_moves_and_deletes_rows() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "completed");
    pick_criterion(&mut ui, index);
    let index = catalog_index(&ui, "hidden");
    pick_criterion(&mut ui, index);
    let before = ids(&ui);

    press(&mut ui, KeyCode::Char('K'));
    assert_eq!(ids(&ui), vec![before[0], before[2], before[1]]);
    assert_eq!(ui.selected, 1);

    // Moving into the first row is refused.
    press(&mut ui, KeyCode::Char('K'));
    assert_eq!(ids(&ui), vec![before[0], before[2], before[1]]);

    press(&mut ui, KeyCode::Delete);
    assert_eq!(ids(&ui), vec![before[0], before[1]]);
    assert_eq!(ui.selected, 1);
}

#[test]
fn mouse_drag_reorders_rows() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "completed");
    pick_criterion(&mut ui, index);
    let index = catalog_index(&ui, "hidden");
    pick_criterion(&mut ui, index);
    let before = ids(&ui);
    let layout = ui.row_layout();
    let first_user_row = layout[1].offset;
    assert!((first_user_row - 6.0).abs() < f32::EPSILON);

    mouse(&mut ui, MouseEventKind::Down(MouseButton::Left), 6);
    assert_eq!(ui.drag.dragged_key(), Some(before[1]));
    // One line is not past the hysteresis band of the next row.
    mouse(&mut ui, MouseEventKind::Drag(MouseButton::Left), 7);
    assert_eq!(ids(&ui), before);
    mouse(&mut ui, MouseEventKind::Drag(MouseButton::Left), 8);
    assert_eq!(ids(&ui), vec![before[0], before[2], before[1]]);
    assert_eq!(ui.selected, 2);

    mouse(&mut ui, MouseEventKind::Up(MouseButton::Left), 8);
    assert!(!ui.drag.is_dragging());
    assert_eq!(ends(&mut ui).len(), 3);
}

#[test]
fn dragging_onto_the_first_row_is_refused() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "completed");
    pick_criterion(&mut ui, index);
    let before = ids(&ui);

    mouse(&mut ui, MouseEventKind::Down(MouseButton::Left), 6);
    mouse(&mut ui, MouseEventKind::Drag(MouseButton::Left), 4);
    assert_eq!(ids(&ui), before);
    assert!(matches!(ui.message.as_ref().map(|m| m.level), Some(MessageLevel::Error)));

    // The first row itself never starts a drag.
    mouse(&mut ui, MouseEventKind::Up(MouseButton::Left), 4);
    mouse(&mut ui, MouseEventKind::Down(MouseButton::Left), 4);
    assert!(!ui.drag.is_dragging());
    assert_eq!(ui.selected, 0);
}

#[test]
fn escape_during_drag_recounts_moved_rows() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "tag_is");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Enter);
    let index = catalog_index(&ui, "tag_is");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Char('j'));
    press(&mut ui, KeyCode::Enter);
    press(&mut ui, KeyCode::Char('c'));
    assert_eq!(ui.app.list.rows()[2].combinator, Combinator::Add);
    // all, AND home, OR work
    assert_eq!(ends(&mut ui), vec![3, 1, 3]);
    let before = ids(&ui);

    mouse(&mut ui, MouseEventKind::Down(MouseButton::Left), 6);
    mouse(&mut ui, MouseEventKind::Drag(MouseButton::Left), 8);
    assert_eq!(ids(&ui), vec![before[0], before[2], before[1]]);
    press(&mut ui, KeyCode::Esc);
    assert!(!ui.drag.is_dragging());
    assert!(!ui.should_quit);
    assert!(ui.app.is_refreshing());

    // all, OR work, AND home
    assert_eq!(ends(&mut ui), vec![3, 3, 1]);
    let rows = ui.app.list.rows();
    assert_eq!(rows[0].counts.start, 0);
    for pair in rows.windows(2) {
        assert_eq!(pair[1].counts.start, pair[0].counts.end);
    }
}

#[test]
fn save_prompts_for_a_title() {
    let (_runtime, mut ui) = ui_with_tasks();
    press(&mut ui, KeyCode::Char('s'));
    type_text(&mut ui, "Work");
    press(&mut ui, KeyCode::Enter);
    // Only the first row: nothing to save yet.
    assert!(matches!(ui.focus, Focus::SaveTitle { .. }));
    press(&mut ui, KeyCode::Esc);

    let index = catalog_index(&ui, "completed");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Char('s'));
    type_text(&mut ui, "Done");
    press(&mut ui, KeyCode::Enter);
    assert!(matches!(ui.focus, Focus::Rows));
    let saved = ui.app.saved.clone().unwrap_or_else(|| panic!("filter not saved"));
    assert_eq!(saved.title, "Done");
    assert!(saved.criterion.contains("completed"));

    // Saving again starts from the current title and updates in place.
    press(&mut ui, KeyCode::Char('s'));
    assert!(matches!(&ui.focus, Focus::SaveTitle { buffer } if buffer == "Done"));
    press(&mut ui, KeyCode::Enter);
    assert_eq!(ui.app.saved.as_ref().and_then(|s| s.id), saved.id);
}

#[test]
fn draw_shows_rows_counts_and_sql() -> Result<()> {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "tag_is");
    pick_criterion(&mut ui, index);
    press(&mut ui, KeyCode::Char('j'));
    press(&mut ui, KeyCode::Enter);
    let _ = ends(&mut ui);

    let mut terminal = Terminal::new(TestBackend::new(80, 30))?;
    terminal.draw(|f| ui.draw(f))?;
    let screen: String = terminal
        .backend()
        .buffer()
        .content()
        .iter()
        .map(|cell| cell.symbol())
        .collect();
    assert!(screen.contains("Unsaved filter"));
    assert!(screen.contains("and Tag is: work"));
    assert!(screen.contains("2 matching"));
    assert!(screen.contains("SQL"));
    Ok(())
}

#[test]
fn count_bar_scales_to_width() {
    let bar = count_bar(RowCounts { start: 10, end: 5, max: 10 }, 10);
    assert_eq!(bar, "█████░░░░░");
    let bar = count_bar(RowCounts { start: 2, end: 10, max: 10 }, 4);
    assert_eq!(bar, "████");
    assert_eq!(count_bar(RowCounts::default(), 3), "   ");
}

#[test]
fn ctrl_c_quits_from_any_focus() {
    let (_runtime, mut ui) = ui_with_tasks();
    let index = catalog_index(&ui, "title");
    pick_criterion(&mut ui, index);
    ui.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(ui.should_quit);
}
