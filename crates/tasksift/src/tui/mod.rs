use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CrosstermEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend, layout::Rect};
use tasksift_app::{FilterRef, FilterService, ProjectConfig, load_catalog};
use tasksift_store_sqlite::SqliteStore;
use tracing::subscriber::NoSubscriber;

mod app;
pub mod constants;
mod view;
mod widgets;

use self::app::App;
use self::constants::TUI_TICK_RATE_MS;
use self::view::Ui;

/// Launch the interactive filter editor, optionally opening a saved filter.
pub fn run(mut store: SqliteStore, config: &ProjectConfig, filter: Option<&str>) -> Result<()> {
    let catalog = load_catalog(&store, config)?;
    let initial = filter
        .map(|raw| FilterService::new(&mut store).load(&FilterRef::parse(raw), &catalog))
        .transpose()?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    let app = App::new(
        runtime.handle().clone(),
        store,
        catalog,
        config.editor.clone(),
        initial,
    );

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let result = tracing::subscriber::with_default(NoSubscriber::default(), || {
        run_event_loop(&mut terminal, Ui::new(app))
    });

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

fn run_event_loop(terminal: &mut Terminal<CrosstermBackend<Stdout>>, mut ui: Ui) -> Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(TUI_TICK_RATE_MS);

    loop {
        let size = terminal.size()?;
        ui.viewport = Rect::new(0, 0, size.width, size.height);
        terminal.draw(|f| ui.draw(f))?;
        if ui.should_quit {
            break;
        }

        let timeout = tick_rate.checked_sub(last_tick.elapsed()).unwrap_or_default();

        if event::poll(timeout)? {
            match event::read()? {
                CrosstermEvent::Key(key) => ui.handle_key(key),
                CrosstermEvent::Mouse(mouse) => ui.handle_mouse(mouse),
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            ui.tick();
            last_tick = Instant::now();
        }
    }

    if let Some(failure) = ui.app.settle() {
        tracing::warn!(%failure, "Count refresh failed while closing");
    }
    Ok(())
}

#[cfg(test)]
mod tests;
