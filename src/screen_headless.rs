//! Capture-only screen for tests, transcripts, and non-interactive runs.
//! Upper-window output is dropped rather than interleaved so captured
//! transcripts stay stable.

use crate::screen::{Screen, ScreenError};

pub struct HeadlessScreen {
    output: String,
    current_window: u16,
    width: u16,
    height: u16,
}

impl HeadlessScreen {
    pub fn new() -> Self {
        HeadlessScreen {
            output: String::new(),
            current_window: 0,
            width: 80,
            height: 24,
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Default for HeadlessScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for HeadlessScreen {
    fn print(&mut self, text: &str) -> Result<(), ScreenError> {
        if self.current_window == 0 {
            self.output.push_str(text);
        }
        Ok(())
    }

    fn print_char(&mut self, ch: char) -> Result<(), ScreenError> {
        if self.current_window == 0 {
            self.output.push(ch);
        }
        Ok(())
    }

    fn split_window(&mut self, _lines: u16) -> Result<(), ScreenError> {
        Ok(())
    }

    fn set_window(&mut self, window: u16) -> Result<(), ScreenError> {
        self.current_window = window;
        Ok(())
    }

    fn erase_window(&mut self, _window: i16) -> Result<(), ScreenError> {
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), ScreenError> {
        Ok(())
    }

    fn set_cursor(&mut self, _line: u16, _column: u16) -> Result<(), ScreenError> {
        Ok(())
    }

    fn set_text_style(&mut self, _style: u16) -> Result<(), ScreenError> {
        Ok(())
    }

    fn show_status(&mut self, _location: &str, _score: i16, _moves: u16) -> Result<(), ScreenError> {
        Ok(())
    }

    fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn captured(&self) -> Option<String> {
        Some(self.output.clone())
    }
}
