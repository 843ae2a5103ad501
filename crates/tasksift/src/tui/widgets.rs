use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use tasksift_core::{CriterionInstance, Picker, RowCounts};
use time::OffsetDateTime;

use super::constants::{
    BAR_CARRIED, BAR_FILLED, PICKER_MIN_HEIGHT, PICKER_MIN_WIDTH, PICKER_POPUP_PERCENT, ROW_HEIGHT,
    ROW_HIGHLIGHT_SYMBOL,
};
use super::view::{Focus, OptionPickerState, Ui};

impl Ui {
    pub(super) fn draw(&self, f: &mut Frame<'_>) {
        let regions = self.regions();
        self.draw_header(f, regions.header);
        self.draw_rows(f, regions.rows);
        self.draw_sql(f, regions.sql);
        self.draw_footer(f, regions.footer);

        match &self.focus {
            Focus::Rows => {}
            Focus::CriterionPicker { selected } => self.draw_criterion_picker(f, *selected),
            Focus::OptionPicker(state) => draw_option_picker(f, state),
            Focus::TextInput { criterion, buffer, .. } => {
                let (prompt, hint) = match criterion.picker() {
                    Picker::Text { prompt, hint } => (prompt, hint),
                    _ => (criterion.title(), ""),
                };
                draw_input_popup(f, prompt, buffer, hint);
            }
            Focus::SaveTitle { buffer } => draw_input_popup(f, "Save filter as", buffer, "Enter to save, Esc to cancel"),
        }
    }

    fn draw_header(&self, f: &mut Frame<'_>, area: Rect) {
        let title = self
            .app
            .saved
            .as_ref()
            .map_or_else(|| "Unsaved filter".to_owned(), |saved| saved.title.clone());
        let matching = self.app.list.rows().last().map_or(0, |row| row.counts.end);
        let mut spans = vec![
            Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("  {matching} matching")),
        ];
        if self.app.is_refreshing() {
            spans.push(Span::styled("  counting…", Style::default().fg(Color::DarkGray)));
        }
        let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title("tasksift"));
        f.render_widget(header, area);
    }

    fn draw_rows(&self, f: &mut Frame<'_>, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Criteria");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let dragged = self.drag.dragged_key();
        let bar_width = inner.width.saturating_sub(4);
        for (index, row) in self.app.list.rows().iter().enumerate() {
            let Some(offset) = u16::try_from(index).ok().and_then(|i| i.checked_mul(ROW_HEIGHT)) else {
                break;
            };
            if offset.saturating_add(ROW_HEIGHT) > inner.height {
                break;
            }
            let slot = Rect {
                x: inner.x,
                y: inner.y + offset,
                width: inner.width,
                height: ROW_HEIGHT,
            };
            let style = if dragged == Some(row.id) {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else if index == self.selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let lines = vec![
                row_line(row, index == self.selected, inner.width),
                Line::from(Span::styled(
                    format!("  {}", count_bar(row.counts, bar_width)),
                    Style::default().fg(Color::Cyan),
                )),
            ];
            f.render_widget(Paragraph::new(lines).style(style), slot);
        }
    }

    fn draw_sql(&self, f: &mut Frame<'_>, area: Rect) {
        let sql = self.app.list.to_sql(OffsetDateTime::now_utc());
        let paragraph = Paragraph::new(sql.trim_start().to_owned())
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("SQL"));
        f.render_widget(paragraph, area);
    }

    fn draw_footer(&self, f: &mut Frame<'_>, area: Rect) {
        let line = self.message.as_ref().map_or_else(
            || Line::from(self.help_text()),
            |message| Line::from(Span::styled(message.text.clone(), message.style())),
        );
        let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        f.render_widget(footer, area);
    }

    const fn help_text(&self) -> &'static str {
        match self.focus {
            Focus::Rows => "a:add  e:edit  d:delete  c:combinator  J/K:move  drag:reorder  s:save  r:recount  q:quit",
            Focus::CriterionPicker { .. } => "j/k:choose  Enter:select  Esc:cancel",
            Focus::OptionPicker(OptionPickerState { multi: true, .. }) => {
                "j/k:choose  Space:toggle  Enter:confirm  Esc:cancel"
            }
            Focus::OptionPicker(_) => "j/k:choose  Enter:confirm  Esc:cancel",
            Focus::TextInput { .. } | Focus::SaveTitle { .. } => "Enter:confirm  Esc:cancel",
        }
    }

    fn draw_criterion_picker(&self, f: &mut Frame<'_>, selected: usize) {
        let items: Vec<ListItem<'_>> = self
            .app
            .catalog
            .iter()
            .map(|criterion| ListItem::new(criterion.title().to_owned()))
            .collect();
        draw_list_popup(f, "Add criterion", items, selected);
    }
}

fn row_line(row: &CriterionInstance, selected: bool, width: u16) -> Line<'static> {
    let marker = if selected { ROW_HIGHLIGHT_SYMBOL } else { "  " };
    let count = row.counts.end.to_string();
    let text_width = usize::from(width).saturating_sub(count.len() + marker.chars().count() + 1);
    let description = row.describe();
    let description: String = description.chars().take(text_width).collect();
    Line::from(vec![
        Span::raw(marker),
        Span::raw(format!("{description:<text_width$}")),
        Span::raw(" "),
        Span::styled(count, Style::default().fg(Color::Cyan)),
    ])
}

/// Text bar for one row: `end` filled, and the part of `start` it dropped shaded.
pub(super) fn count_bar(counts: RowCounts, width: u16) -> String {
    let width_cells = usize::from(width);
    if counts.max == 0 || width_cells == 0 {
        return " ".repeat(width_cells);
    }
    let scale = |value: u64| {
        let scaled = value.min(counts.max).saturating_mul(u64::from(width)) / counts.max;
        usize::try_from(scaled).unwrap_or(width_cells)
    };
    let filled = scale(counts.end);
    let carried = scale(counts.start).saturating_sub(filled);
    let mut bar = String::with_capacity(width_cells * 3);
    bar.extend(std::iter::repeat_n(BAR_FILLED, filled));
    bar.extend(std::iter::repeat_n(BAR_CARRIED, carried));
    bar.extend(std::iter::repeat_n(' ', width_cells - filled - carried));
    bar
}

fn draw_option_picker(f: &mut Frame<'_>, state: &OptionPickerState) {
    let items: Vec<ListItem<'_>> = state
        .criterion
        .options()
        .iter()
        .enumerate()
        .map(|(index, option)| {
            let label = if state.multi {
                let mark = if state.chosen.contains(&index) { "[x]" } else { "[ ]" };
                format!("{mark} {}", option.label)
            } else {
                option.label.clone()
            };
            ListItem::new(label)
        })
        .collect();
    draw_list_popup(f, state.criterion.title(), items, state.selected);
}

fn draw_list_popup(f: &mut Frame<'_>, title: &str, items: Vec<ListItem<'_>>, selected: usize) {
    let area = popup_area(f.area());
    let list = List::new(items)
        .block(
            Block::default()
                .title(title.to_owned())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow))
        .highlight_symbol(ROW_HIGHLIGHT_SYMBOL);
    let mut state = ListState::default().with_selected(Some(selected));
    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_input_popup(f: &mut Frame<'_>, prompt: &str, buffer: &str, hint: &str) {
    let area = popup_area(f.area());
    let area = Rect {
        height: area.height.min(PICKER_MIN_HEIGHT),
        ..area
    };
    let lines = vec![
        Line::from(Span::raw(format!("{buffer}_"))),
        Line::from(Span::styled(hint.to_owned(), Style::default().fg(Color::DarkGray))),
    ];
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(prompt.to_owned())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn popup_area(area: Rect) -> Rect {
    let width = (area.width * PICKER_POPUP_PERCENT / 100).max(PICKER_MIN_WIDTH).min(area.width);
    let height = (area.height * PICKER_POPUP_PERCENT / 100)
        .max(PICKER_MIN_HEIGHT)
        .min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
