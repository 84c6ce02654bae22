//! Screen sink contract. Print opcodes call into this trait; how the
//! text reaches a terminal (or a test buffer) is the implementation's
//! business. All calls are synchronous.

use crate::screen_headless::HeadlessScreen;
use crate::screen_terminal::TerminalScreen;
use log::debug;
use std::fmt;

#[derive(Debug, Clone)]
pub struct ScreenError {
    pub message: String,
}

impl ScreenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "screen error: {}", self.message)
    }
}

impl std::error::Error for ScreenError {}

impl From<std::io::Error> for ScreenError {
    fn from(e: std::io::Error) -> Self {
        ScreenError::new(format!("I/O error: {e}"))
    }
}

pub trait Screen {
    fn print(&mut self, text: &str) -> Result<(), ScreenError>;

    fn print_char(&mut self, ch: char) -> Result<(), ScreenError>;

    /// Split off an upper window of `lines` rows (the V3 status line is
    /// a 1-row split).
    fn split_window(&mut self, lines: u16) -> Result<(), ScreenError>;

    /// Select window 0 (lower/main) or 1 (upper).
    fn set_window(&mut self, window: u16) -> Result<(), ScreenError>;

    /// Erase a window: -1 clears the whole screen.
    fn erase_window(&mut self, window: i16) -> Result<(), ScreenError>;

    fn erase_line(&mut self) -> Result<(), ScreenError>;

    /// 1-based cursor position, upper window only in V3/V4.
    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), ScreenError>;

    fn set_text_style(&mut self, style: u16) -> Result<(), ScreenError>;

    fn buffer_mode(&mut self, _buffered: bool) -> Result<(), ScreenError> {
        Ok(())
    }

    fn show_status(&mut self, location: &str, score: i16, moves: u16) -> Result<(), ScreenError>;

    /// (columns, rows)
    fn dimensions(&self) -> (u16, u16);

    fn flush(&mut self) -> Result<(), ScreenError> {
        Ok(())
    }

    /// Captured output, where the implementation records any (test
    /// screens do; terminals don't).
    fn captured(&self) -> Option<String> {
        None
    }
}

/// Screen selection: honor an explicit choice, otherwise fall back to
/// headless when stdout isn't a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    #[default]
    Auto,
    Terminal,
    Headless,
}

pub fn create_screen(mode: ScreenMode) -> Box<dyn Screen> {
    let use_terminal = match mode {
        ScreenMode::Terminal => true,
        ScreenMode::Headless => false,
        ScreenMode::Auto => atty::is(atty::Stream::Stdout),
    };
    if use_terminal {
        debug!("using terminal screen");
        Box::new(TerminalScreen::new())
    } else {
        debug!("using headless screen");
        Box::new(HeadlessScreen::new())
    }
}
