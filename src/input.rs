//! Input sources. The read opcodes suspend the whole machine until the
//! source supplies a value: in this single-threaded runtime that is a
//! blocking call whose `Trap` channel carries the "interrupted" escape
//! path, so a source that runs dry (or hits EOF) unwinds the run loop
//! cleanly instead of crashing it.

use crate::fault::Trap;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

pub trait InputSource {
    /// Read one command line, up to `max_len` characters.
    fn read_line(&mut self, max_len: usize) -> Result<String, Trap>;

    /// Read a single character.
    fn read_char(&mut self) -> Result<char, Trap>;
}

/// Interactive stdin. EOF is an interruption, not an error.
pub struct StdinInput;

impl StdinInput {
    pub fn new() -> Self {
        StdinInput
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for StdinInput {
    fn read_line(&mut self, max_len: usize) -> Result<String, Trap> {
        io::stdout().flush().ok();
        let mut line = String::new();
        let n = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|_| Trap::Interrupted)?;
        if n == 0 {
            return Err(Trap::Interrupted);
        }
        let mut line = line.trim_end_matches(['\n', '\r']).to_string();
        line.truncate(max_len);
        Ok(line)
    }

    fn read_char(&mut self) -> Result<char, Trap> {
        let line = self.read_line(1)?;
        Ok(line.chars().next().unwrap_or('\n'))
    }
}

/// Scripted input for transcript replay and tests. Exhaustion interrupts
/// the run.
pub struct ScriptedInput {
    lines: VecDeque<String>,
    /// Echo consumed commands to the screen? Transcripts usually want it.
    pub echo: bool,
    echoed: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInput {
            lines: lines.into_iter().map(Into::into).collect(),
            echo: false,
            echoed: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }

    pub fn consumed(&self) -> &[String] {
        &self.echoed
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self, max_len: usize) -> Result<String, Trap> {
        match self.lines.pop_front() {
            Some(mut line) => {
                line.truncate(max_len);
                self.echoed.push(line.clone());
                Ok(line)
            }
            None => Err(Trap::Interrupted),
        }
    }

    fn read_char(&mut self) -> Result<char, Trap> {
        let line = self.read_line(1)?;
        Ok(line.chars().next().unwrap_or('\n'))
    }
}
