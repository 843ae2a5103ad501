use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::{Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Style};
use tasksift_core::drag::{DragState, ItemBounds, Swap, uniform_layout};
use tasksift_core::{Criterion, InstanceId, Picker, Selection};

use super::app::App;
use super::constants::{FOOTER_HEIGHT, HEADER_HEIGHT, ROW_HEIGHT, SQL_PANE_HEIGHT, UI_MESSAGE_TTL_SECS};

/// Option picker for single- and multi-select criteria.
pub(super) struct OptionPickerState {
    pub(super) criterion: Arc<Criterion>,
    pub(super) selected: usize,
    pub(super) chosen: BTreeSet<usize>,
    pub(super) multi: bool,
    /// Row being re-picked; `None` when adding.
    pub(super) target: Option<usize>,
}

/// What currently receives key presses.
pub(super) enum Focus {
    /// Browsing and editing rows.
    Rows,
    /// Choosing which criterion to add.
    CriterionPicker { selected: usize },
    /// Choosing option values for a new or existing row.
    OptionPicker(OptionPickerState),
    /// Typing the value of a text criterion.
    TextInput {
        criterion: Arc<Criterion>,
        buffer: String,
        target: Option<usize>,
    },
    /// Typing the title to save the filter under.
    SaveTitle { buffer: String },
}

/// Screen regions, derived from the terminal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Regions {
    pub(super) header: Rect,
    pub(super) rows: Rect,
    pub(super) sql: Rect,
    pub(super) footer: Rect,
}

impl Regions {
    pub(super) fn split(area: Rect) -> Self {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(HEADER_HEIGHT),
                Constraint::Min(ROW_HEIGHT + 2),
                Constraint::Length(SQL_PANE_HEIGHT),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);
        Self {
            header: chunks[0],
            rows: chunks[1],
            sql: chunks[2],
            footer: chunks[3],
        }
    }

    /// Area inside the rows pane border.
    pub(super) fn rows_inner(&self) -> Rect {
        self.rows.inner(Margin::new(1, 1))
    }
}

pub(super) struct Ui {
    pub(super) app: App,
    pub(super) selected: usize,
    pub(super) focus: Focus,
    pub(super) drag: DragState<InstanceId>,
    pub(super) viewport: Rect,
    pub(super) message: Option<Message>,
    pub(super) should_quit: bool,
    last_pointer_row: u16,
    drag_moved: bool,
}

impl Ui {
    pub(super) fn new(app: App) -> Self {
        Self {
            app,
            selected: 0,
            focus: Focus::Rows,
            drag: DragState::Idle,
            viewport: Rect::default(),
            message: None,
            should_quit: false,
            last_pointer_row: 0,
            drag_moved: false,
        }
    }

    pub(super) fn regions(&self) -> Regions {
        Regions::split(self.viewport)
    }

    /// Row bounds in terminal lines, one item per list row.
    pub(super) fn row_layout(&self) -> Vec<ItemBounds<InstanceId>> {
        let keys: Vec<InstanceId> = self.app.list.rows().iter().map(|row| row.id).collect();
        let inner = self.regions().rows_inner();
        uniform_layout(&keys, f32::from(inner.y), f32::from(ROW_HEIGHT))
    }

    pub(super) fn info(&mut self, message: impl Into<String>) {
        self.message = Some(Message::info(message));
    }

    pub(super) fn error(&mut self, message: impl Into<String>) {
        self.message = Some(Message::error(message));
    }

    pub(super) fn tick(&mut self) {
        if let Some(failure) = self.app.poll_refreshes() {
            self.error(failure);
        }
        if let Some(msg) = &self.message
            && msg.is_expired(Duration::from_secs(UI_MESSAGE_TTL_SECS))
        {
            self.message = None;
        }
    }

    pub(super) fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match std::mem::replace(&mut self.focus, Focus::Rows) {
            Focus::Rows => self.handle_rows_key(key),
            Focus::CriterionPicker { selected } => self.handle_criterion_picker_key(key, selected),
            Focus::OptionPicker(state) => self.handle_option_picker_key(key, state),
            Focus::TextInput {
                criterion,
                buffer,
                target,
            } => self.handle_text_key(key, criterion, buffer, target),
            Focus::SaveTitle { buffer } => self.handle_save_key(key, buffer),
        }
    }

    fn handle_rows_key(&mut self, key: KeyEvent) {
        let last = self.app.rows_len().saturating_sub(1);
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => {
                if self.drag.is_dragging() {
                    self.end_drag(self.drag.cancel());
                } else {
                    self.should_quit = true;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => self.selected = (self.selected + 1).min(last),
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Char('a') => {
                if self.app.catalog.is_empty() {
                    self.error("no criteria available");
                } else {
                    self.focus = Focus::CriterionPicker { selected: 0 };
                }
            }
            KeyCode::Char('e') | KeyCode::Enter => self.begin_value_edit(),
            KeyCode::Char('d') | KeyCode::Delete => match self.app.remove(self.selected) {
                Ok(()) => self.selected = self.selected.min(self.app.rows_len().saturating_sub(1)),
                Err(err) => self.error(err.to_string()),
            },
            KeyCode::Char('c') => match self.app.cycle_combinator(self.selected) {
                Ok(combinator) => self.info(format!("row {} now joins with {combinator}", self.selected)),
                Err(err) => self.error(err.to_string()),
            },
            KeyCode::Char('J') => self.move_selected(self.selected + 1),
            KeyCode::Char('K') => self.move_selected(self.selected.saturating_sub(1)),
            KeyCode::Char('s') => {
                let buffer = self.app.saved.as_ref().map(|saved| saved.title.clone()).unwrap_or_default();
                self.focus = Focus::SaveTitle { buffer };
            }
            KeyCode::Char('r') => {
                self.app.refresh();
                self.info("refreshing counts");
            }
            _ => {}
        }
    }

    fn move_selected(&mut self, to: usize) {
        if to == self.selected || to >= self.app.rows_len() {
            return;
        }
        match self.app.move_row(self.selected, to, true) {
            Ok(()) => self.selected = to,
            Err(err) => self.error(err.to_string()),
        }
    }

    fn handle_criterion_picker_key(&mut self, key: KeyEvent, selected: usize) {
        let last = self.app.catalog.len().saturating_sub(1);
        match key.code {
            KeyCode::Esc => {}
            KeyCode::Down | KeyCode::Char('j') => {
                self.focus = Focus::CriterionPicker {
                    selected: (selected + 1).min(last),
                };
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.focus = Focus::CriterionPicker {
                    selected: selected.saturating_sub(1),
                };
            }
            KeyCode::Enter => {
                let picked = self.app.catalog.iter().nth(selected).cloned();
                if let Some(criterion) = picked {
                    self.begin_value_entry(criterion, None);
                }
            }
            _ => self.focus = Focus::CriterionPicker { selected },
        }
    }

    /// Reopen the picker of the selected row with its current value.
    fn begin_value_edit(&mut self) {
        let picked = self
            .app
            .list
            .rows()
            .get(self.selected)
            .map(|row| (Arc::clone(&row.criterion), row.selection.clone()));
        let Some((criterion, current)) = picked else {
            return;
        };
        if self.selected == 0 || matches!(criterion.picker(), Picker::None) {
            self.error("this row has no value to change");
            return;
        }
        self.begin_value_entry(criterion, Some(self.selected));
        match (&mut self.focus, current) {
            (Focus::TextInput { buffer, .. }, Selection::Text(text)) => *buffer = text,
            (Focus::OptionPicker(state), Selection::Choice(value)) => {
                state.selected = option_index(&state.criterion, &value).unwrap_or_default();
            }
            (Focus::OptionPicker(state), Selection::Choices(values)) => {
                state.chosen = values
                    .iter()
                    .filter_map(|value| option_index(&state.criterion, value))
                    .collect();
                state.selected = state.chosen.first().copied().unwrap_or_default();
            }
            _ => {}
        }
    }

    /// Open the picker `criterion` asks for, or commit it straight away.
    fn begin_value_entry(&mut self, criterion: Arc<Criterion>, target: Option<usize>) {
        let (multi, empty) = match criterion.picker() {
            Picker::None => {
                self.commit_value(criterion, Selection::None, target);
                return;
            }
            Picker::Text { .. } => {
                self.focus = Focus::TextInput {
                    criterion,
                    buffer: String::new(),
                    target,
                };
                return;
            }
            Picker::Single(options) => (false, options.is_empty()),
            Picker::Multi(options) => (true, options.is_empty()),
        };
        if empty {
            self.error(format!("{} has nothing to choose from yet", criterion.title()));
            return;
        }
        self.focus = Focus::OptionPicker(OptionPickerState {
            criterion,
            selected: 0,
            chosen: BTreeSet::new(),
            multi,
            target,
        });
    }

    fn handle_option_picker_key(&mut self, key: KeyEvent, mut state: OptionPickerState) {
        let options = state.criterion.options();
        let last = options.len().saturating_sub(1);
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Down | KeyCode::Char('j') => state.selected = (state.selected + 1).min(last),
            KeyCode::Up | KeyCode::Char('k') => state.selected = state.selected.saturating_sub(1),
            KeyCode::Char(' ') if state.multi => {
                if !state.chosen.remove(&state.selected) {
                    state.chosen.insert(state.selected);
                }
            }
            KeyCode::Enter => {
                let selection = if state.multi {
                    let indices = if state.chosen.is_empty() {
                        BTreeSet::from([state.selected])
                    } else {
                        state.chosen.clone()
                    };
                    Selection::Choices(
                        indices
                            .iter()
                            .filter_map(|&index| options.get(index))
                            .map(|option| option.value.clone())
                            .collect(),
                    )
                } else {
                    let Some(option) = options.get(state.selected) else {
                        return;
                    };
                    Selection::Choice(option.value.clone())
                };
                self.commit_value(state.criterion, selection, state.target);
                return;
            }
            _ => {}
        }
        self.focus = Focus::OptionPicker(state);
    }

    fn handle_text_key(&mut self, key: KeyEvent, criterion: Arc<Criterion>, mut buffer: String, target: Option<usize>) {
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Enter => {
                self.commit_value(criterion, Selection::Text(buffer), target);
                return;
            }
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) => buffer.push(c),
            _ => {}
        }
        self.focus = Focus::TextInput {
            criterion,
            buffer,
            target,
        };
    }

    fn handle_save_key(&mut self, key: KeyEvent, mut buffer: String) {
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Enter => {
                match self.app.save(&buffer) {
                    Ok(saved) => self.info(format!("saved filter '{}'", saved.title)),
                    Err(err) => {
                        self.error(format!("{err:#}"));
                        self.focus = Focus::SaveTitle { buffer };
                    }
                }
                return;
            }
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) => buffer.push(c),
            _ => {}
        }
        self.focus = Focus::SaveTitle { buffer };
    }

    /// Add a row, or change the value of row `target`.
    fn commit_value(&mut self, criterion: Arc<Criterion>, selection: Selection, target: Option<usize>) {
        let result = match target {
            Some(index) => self.app.set_selection(index, selection),
            None => self.app.add(criterion, selection).map(|()| {
                self.selected = self.app.rows_len().saturating_sub(1);
            }),
        };
        if let Err(err) = result {
            self.error(format!("{err:#}"));
        }
    }

    pub(super) fn handle_mouse(&mut self, mouse: MouseEvent) {
        if !matches!(self.focus, Focus::Rows) {
            return;
        }
        let y = f32::from(mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let layout = self.row_layout();
                let Some(item) = layout.iter().find(|item| item.contains(y)) else {
                    return;
                };
                self.selected = item.index;
                // The first row is fixed.
                if item.index > 0 {
                    self.drag = self.drag.start(y, &layout);
                    self.last_pointer_row = mouse.row;
                    self.drag_moved = false;
                }
            }
            MouseEventKind::Drag(MouseButton::Left) if self.drag.is_dragging() => {
                let dy = y - f32::from(self.last_pointer_row);
                self.last_pointer_row = mouse.row;
                let (drag, swap) = self.drag.drag(dy, &self.row_layout());
                self.drag = drag;
                if let Some(Swap { from, to }) = swap {
                    match self.app.move_row(from, to, false) {
                        Ok(()) => {
                            self.selected = to;
                            self.drag_moved = true;
                        }
                        Err(err) => self.error(err.to_string()),
                    }
                }
            }
            MouseEventKind::Up(MouseButton::Left) if self.drag.is_dragging() => {
                self.end_drag(self.drag.release());
            }
            _ => {}
        }
    }

    /// Leave the drag; swaps made during it are recounted once.
    fn end_drag(&mut self, next: DragState<InstanceId>) {
        self.drag = next;
        if std::mem::take(&mut self.drag_moved) {
            self.app.refresh();
        }
    }
}

fn option_index(criterion: &Criterion, value: &str) -> Option<usize> {
    criterion.options().iter().position(|option| option.value == value)
}

pub(super) struct Message {
    pub(super) text: String,
    pub(super) level: MessageLevel,
    created_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MessageLevel {
    Info,
    Error,
}

impl Message {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: MessageLevel::Info,
            created_at: Instant::now(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: MessageLevel::Error,
            created_at: Instant::now(),
        }
    }

    pub(super) fn style(&self) -> Style {
        match self.level {
            MessageLevel::Info => Style::default().fg(Color::Green),
            MessageLevel::Error => Style::default().fg(Color::Red),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}
