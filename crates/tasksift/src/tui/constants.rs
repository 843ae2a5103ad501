//! Shared constants for the TUI to keep layout and timing in sync.

/// Interval in milliseconds between UI ticks/redraws.
pub const TUI_TICK_RATE_MS: u64 = 200;
/// Time-to-live in seconds for transient status messages.
pub const UI_MESSAGE_TTL_SECS: u64 = 5;
/// Terminal lines taken by one criterion row (description and count bar).
pub const ROW_HEIGHT: u16 = 2;
/// Height of the SQL preview pane.
pub const SQL_PANE_HEIGHT: u16 = 5;
/// Height of the header showing the filter title.
pub const HEADER_HEIGHT: u16 = 3;
/// Height of the key help and status footer.
pub const FOOTER_HEIGHT: u16 = 3;
/// Highlight symbol shown beside the selected row.
pub const ROW_HIGHLIGHT_SYMBOL: &str = "▶ ";
/// Glyph filling the matched part of a count bar.
pub const BAR_FILLED: char = '█';
/// Glyph filling the part of a count bar matched by the rows above only.
pub const BAR_CARRIED: char = '░';
/// Width/height percentage allocated to picker popups.
pub const PICKER_POPUP_PERCENT: u16 = 60;
/// Minimum width for picker popups.
pub const PICKER_MIN_WIDTH: u16 = 30;
/// Minimum height for picker popups.
pub const PICKER_MIN_HEIGHT: u16 = 6;
