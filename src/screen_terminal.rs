//! Plain-terminal screen using crossterm. Keeps a 1-row upper window for
//! the V3 status line; printing to the lower window goes straight to
//! stdout so shell piping keeps working.

use crate::screen::{Screen, ScreenError};
use crossterm::{
    cursor,
    style::{Attribute, SetAttribute},
    terminal::{self, Clear, ClearType},
    QueueableCommand,
};
use std::io::{self, Write};

pub struct TerminalScreen {
    current_window: u16,
    upper_lines: u16,
    width: u16,
    height: u16,
    /// Cursor within the upper window while it is selected.
    saved_cursor: (u16, u16),
}

impl TerminalScreen {
    pub fn new() -> Self {
        let (width, height) = terminal::size().unwrap_or((80, 24));
        TerminalScreen {
            current_window: 0,
            upper_lines: 0,
            width,
            height,
            saved_cursor: (1, 1),
        }
    }
}

impl Default for TerminalScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for TerminalScreen {
    fn print(&mut self, text: &str) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        if self.current_window == 0 {
            // Terminals want \r\n in raw-ish contexts; plain writes are
            // fine here since we never enter raw mode.
            out.write_all(text.as_bytes())?;
        } else {
            let (line, col) = self.saved_cursor;
            out.queue(cursor::SavePosition)?
                .queue(cursor::MoveTo(col.saturating_sub(1), line.saturating_sub(1)))?;
            out.write_all(text.as_bytes())?;
            out.queue(cursor::RestorePosition)?;
            self.saved_cursor = (line, col + text.chars().count() as u16);
        }
        out.flush()?;
        Ok(())
    }

    fn print_char(&mut self, ch: char) -> Result<(), ScreenError> {
        let mut buf = [0u8; 4];
        self.print(ch.encode_utf8(&mut buf))
    }

    fn split_window(&mut self, lines: u16) -> Result<(), ScreenError> {
        self.upper_lines = lines;
        Ok(())
    }

    fn set_window(&mut self, window: u16) -> Result<(), ScreenError> {
        self.current_window = window;
        if window == 1 {
            self.saved_cursor = (1, 1);
        }
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        if window == -1 {
            out.queue(Clear(ClearType::All))?
                .queue(cursor::MoveTo(0, self.upper_lines))?;
            out.flush()?;
        }
        // Erasing a single window on a scrolling terminal is a no-op.
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        out.queue(Clear(ClearType::UntilNewLine))?;
        out.flush()?;
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), ScreenError> {
        if self.current_window == 1 {
            self.saved_cursor = (line, column);
        }
        Ok(())
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        if style == 0 {
            out.queue(SetAttribute(Attribute::Reset))?;
        } else {
            if style & 0x01 != 0 {
                out.queue(SetAttribute(Attribute::Reverse))?;
            }
            if style & 0x02 != 0 {
                out.queue(SetAttribute(Attribute::Bold))?;
            }
            if style & 0x04 != 0 {
                out.queue(SetAttribute(Attribute::Italic))?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn show_status(&mut self, location: &str, score: i16, moves: u16) -> Result<(), ScreenError> {
        let right = format!("Score: {score}  Moves: {moves}");
        let pad = (self.width as usize)
            .saturating_sub(location.len() + right.len() + 3)
            .max(1);
        let mut out = io::stdout();
        out.queue(cursor::SavePosition)?
            .queue(cursor::MoveTo(0, 0))?
            .queue(SetAttribute(Attribute::Reverse))?;
        write!(out, " {}{}{} ", location, " ".repeat(pad), right)?;
        out.queue(SetAttribute(Attribute::Reset))?
            .queue(cursor::RestorePosition)?;
        out.flush()?;
        Ok(())
    }

    fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn flush(&mut self) -> Result<(), ScreenError> {
        io::stdout().flush()?;
        Ok(())
    }
}
