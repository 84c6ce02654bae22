//! One machine instance: story memory, evaluation stack, caches, and the
//! runtime services generated code calls into. Nothing here is global;
//! several machines can run side by side as long as each owns its own
//! instance.

use crate::config::{ExecMode, RunConfig};
use crate::dictionary::Dictionary;
use crate::fault::{Fault, FaultReport, Termination, Trap};
use crate::header::Header;
use crate::hooks::{MachineHooks, NullHooks};
use crate::input::{InputSource, StdinInput};
use crate::instruction::InstructionCache;
use crate::jit::ops::CompiledRoutine;
use crate::memory::Memory;
use crate::object::ObjectTable;
use crate::routine::Routine;
use crate::screen::{create_screen, Screen, ScreenMode};
use crate::text;
use crate::zrand::ZRand;
use indexmap::IndexMap;
use log::{debug, info};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The bytecode's explicit operand stack. The pointer lives in
/// `[-1, capacity-1]`; -1 is empty. Boundary violations are exact faults,
/// checked at every access.
pub struct EvalStack {
    items: Vec<u16>,
    capacity: usize,
}

impl EvalStack {
    pub fn new(capacity: usize) -> Self {
        EvalStack {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Stack pointer: -1 when empty, else index of the top element.
    pub fn sp(&self) -> isize {
        self.items.len() as isize - 1
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn push(&mut self, value: u16) -> Result<(), Fault> {
        if self.items.len() == self.capacity {
            return Err(Fault::StackFull);
        }
        self.items.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, Fault> {
        self.items.pop().ok_or(Fault::StackEmpty)
    }

    pub fn peek(&self) -> Result<u16, Fault> {
        self.items.last().copied().ok_or(Fault::StackEmpty)
    }

    /// Replace the top without moving the pointer.
    pub fn set_top(&mut self, value: u16) -> Result<(), Fault> {
        match self.items.last_mut() {
            Some(top) => {
                *top = value;
                Ok(())
            }
            None => Err(Fault::StackEmpty),
        }
    }

    /// Discard everything above `depth`; routine return discipline.
    pub fn truncate(&mut self, depth: usize) {
        self.items.truncate(depth);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// An output-stream-3 redirection target.
struct Stream3Table {
    addr: u16,
    count: u16,
}

const STREAM3_MAX_DEPTH: usize = 16;
const GLOBAL_COUNT: u16 = 240;

pub struct Machine {
    pub header: Header,
    pub memory: Memory,
    pub stack: EvalStack,
    pub rng: ZRand,
    pub screen: Box<dyn Screen>,
    pub input: Box<dyn InputSource>,
    pub hooks: Box<dyn MachineHooks>,
    pub objects: ObjectTable,
    pub dictionary: Dictionary,
    pub config: RunConfig,
    /// Decode memo, shared by discovery, graph building and codegen.
    pub instructions: InstructionCache,
    /// Routine descriptors, keyed by address, built lazily.
    pub routines: IndexMap<u32, Rc<Routine>>,
    /// Compiled units, keyed by address, append-only.
    pub(crate) compiled: IndexMap<u32, Rc<CompiledRoutine>>,
    /// Address of the last executed instruction, for fault reports.
    pub last_addr: u32,
    /// Current nesting of routine calls.
    pub call_depth: usize,
    ops_executed: u64,
    stop: Arc<AtomicBool>,
    stream3: Vec<Stream3Table>,
    screen_stream_on: bool,
}

impl Machine {
    pub fn new(story: Vec<u8>, config: RunConfig) -> Result<Machine, Fault> {
        let screen = create_screen(ScreenMode::Auto);
        Machine::with_io(story, config, screen, Box::new(StdinInput::new()))
    }

    pub fn with_io(
        story: Vec<u8>,
        config: RunConfig,
        screen: Box<dyn Screen>,
        input: Box<dyn InputSource>,
    ) -> Result<Machine, Fault> {
        let header = Header::parse(&story)?;
        let mut memory = Memory::new(story, header.base_static_mem);
        // Screen dimensions belong in the header (bytes 0x20/0x21) so
        // stories can query them.
        let (width, height) = screen.dimensions();
        memory.write_byte(0x20, height.min(255) as u8)?;
        memory.write_byte(0x21, width.min(255) as u8)?;
        let objects = ObjectTable::new(header.object_table, header.version, header.abbrev_table);
        let dictionary = Dictionary::new(header.dictionary, header.version);
        let rng = match config.seed {
            Some(seed) => ZRand::new_predictable(seed),
            None => ZRand::new_uniform(),
        };
        info!(
            "loaded story: version {}, release {}, serial {}",
            header.version, header.release, header.serial
        );

        Ok(Machine {
            stack: EvalStack::new(config.stack_capacity),
            rng,
            screen,
            input,
            hooks: Box::new(NullHooks),
            objects,
            dictionary,
            config,
            instructions: InstructionCache::new(),
            routines: IndexMap::new(),
            compiled: IndexMap::new(),
            last_addr: header.initial_pc as u32,
            call_depth: 0,
            ops_executed: 0,
            stop: Arc::new(AtomicBool::new(false)),
            stream3: Vec::new(),
            screen_stream_on: true,
            header,
            memory,
        })
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Handle for cooperative stop requests from another thread; polled
    /// between instructions at the configured granularity.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Per-operation bookkeeping: last-address tracking happens at the
    /// call sites; this counts work and polls the stop token.
    pub fn tick(&mut self) -> Result<(), Trap> {
        self.ops_executed += 1;
        let interval = (self.config.stop_check_interval as u64).max(1);
        if self.ops_executed % interval == 0 && self.stop.load(Ordering::Relaxed) {
            return Err(Trap::Interrupted);
        }
        Ok(())
    }

    pub fn ops_executed(&self) -> u64 {
        self.ops_executed
    }

    // ---- variables ----

    /// Read a global by variable number (0x10-0xFF).
    pub fn read_global(&self, var: u8) -> Result<u16, Fault> {
        debug_assert!(var >= 0x10);
        self.global_slot((var - 0x10) as u16)
    }

    pub fn write_global(&mut self, var: u8, value: u16) -> Result<(), Fault> {
        debug_assert!(var >= 0x10);
        self.set_global_slot((var - 0x10) as u16, value)
    }

    /// Read a global by table index 0..239.
    pub fn global_slot(&self, index: u16) -> Result<u16, Fault> {
        if index >= GLOBAL_COUNT {
            return Err(Fault::GlobalOutOfRange(index));
        }
        self.memory
            .read_word(self.header.global_variables as u32 + index as u32 * 2)
    }

    pub fn set_global_slot(&mut self, index: u16, value: u16) -> Result<(), Fault> {
        if index >= GLOBAL_COUNT {
            return Err(Fault::GlobalOutOfRange(index));
        }
        self.memory
            .write_word(self.header.global_variables as u32 + index as u32 * 2, value)
    }

    // ---- routine discovery ----

    /// Descriptor for the routine at `addr`, building it on first
    /// reference.
    pub fn routine(&mut self, addr: u32) -> Result<Rc<Routine>, Fault> {
        if let Some(r) = self.routines.get(&addr) {
            return Ok(Rc::clone(r));
        }
        let r = Rc::new(Routine::build(
            &self.memory,
            &mut self.instructions,
            addr,
            self.header.version,
        )?);
        self.routines.insert(addr, Rc::clone(&r));
        Ok(r)
    }

    /// Descriptor for the entry point. V1-5 entry is a bare instruction
    /// stream with no locals header.
    pub fn main_routine(&mut self) -> Result<Rc<Routine>, Fault> {
        let addr = self.header.initial_pc as u32;
        if let Some(r) = self.routines.get(&addr) {
            return Ok(Rc::clone(r));
        }
        let r = Rc::new(Routine::build_main(
            &self.memory,
            &mut self.instructions,
            addr,
            self.header.version,
        )?);
        self.routines.insert(addr, Rc::clone(&r));
        Ok(r)
    }

    // ---- output ----

    pub fn print_str(&mut self, s: &str) -> Result<(), Fault> {
        if !self.stream3.is_empty() {
            for ch in s.chars() {
                self.stream3_put(ch)?;
            }
            return Ok(());
        }
        if self.screen_stream_on {
            self.screen
                .print(s)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Ok(())
    }

    pub fn print_char_code(&mut self, code: u16) -> Result<(), Fault> {
        if let Some(ch) = text::zscii_to_char(code) {
            let mut buf = [0u8; 4];
            self.print_str(ch.encode_utf8(&mut buf))?;
        } else {
            debug!("print_char with unprintable code {code}");
        }
        Ok(())
    }

    pub fn new_line(&mut self) -> Result<(), Fault> {
        self.print_str("\n")
    }

    fn stream3_put(&mut self, ch: char) -> Result<(), Fault> {
        let table = self.stream3.last_mut().expect("stream 3 active");
        let code: u8 = if ch == '\n' { 13 } else { ch as u8 };
        let addr = table.addr as u32 + 2 + table.count as u32;
        table.count += 1;
        let count = table.count;
        let table_addr = table.addr;
        self.memory.write_byte(addr, code)?;
        // Keep the count current so a mid-run fault leaves a sane table.
        self.memory.write_word(table_addr as u32, count)
    }

    /// `output_stream` opcode: positive selects, negative deselects.
    /// Only streams 1 (screen) and 3 (memory table) are honored; the
    /// others are logged and ignored.
    pub fn select_output_stream(&mut self, stream: i16, table: Option<u16>) -> Result<(), Fault> {
        match stream {
            0 => Ok(()),
            1 => {
                self.screen_stream_on = true;
                Ok(())
            }
            -1 => {
                self.screen_stream_on = false;
                Ok(())
            }
            3 => {
                if self.stream3.len() >= STREAM3_MAX_DEPTH {
                    return Err(Fault::StreamOverflow);
                }
                let addr = table.unwrap_or(0);
                self.memory.write_word(addr as u32, 0)?;
                self.stream3.push(Stream3Table { addr, count: 0 });
                Ok(())
            }
            -3 => {
                if let Some(t) = self.stream3.pop() {
                    self.memory.write_word(t.addr as u32, t.count)?;
                }
                Ok(())
            }
            other => {
                debug!("output_stream {other} ignored");
                Ok(())
            }
        }
    }

    /// V3 status line: location object name from G00, score/moves from
    /// G01/G02.
    pub fn show_status(&mut self) -> Result<(), Fault> {
        let location = self.global_slot(0)?;
        let score = self.global_slot(1)? as i16;
        let moves = self.global_slot(2)?;
        let name = if location != 0 {
            self.objects.short_name(&self.memory, location)?
        } else {
            String::new()
        };
        self.screen
            .show_status(&name, score, moves)
            .map_err(|e| Fault::Screen(e.message))
    }

    // ---- input ----

    /// The `sread`/`aread` service: status line (V1-3), one input line
    /// into the text buffer, optional tokenization into the parse
    /// buffer. Returns the terminating character (always newline here).
    pub fn read_line_into(&mut self, text_buf: u16, parse_buf: u16) -> Result<u16, Trap> {
        if self.header.version <= 3 {
            self.show_status()?;
        }
        let max_len = self.memory.read_byte(text_buf as u32)? as usize;
        let line = self.input.read_line(max_len)?;
        let line = line.to_lowercase();

        let (first_char, needs_len) = if self.header.version <= 4 {
            (1u32, false)
        } else {
            (2u32, true)
        };
        for (i, b) in line.bytes().enumerate() {
            self.memory.write_byte(text_buf as u32 + first_char + i as u32, b)?;
        }
        if needs_len {
            self.memory.write_byte(text_buf as u32 + 1, line.len() as u8)?;
        } else {
            self.memory
                .write_byte(text_buf as u32 + first_char + line.len() as u32, 0)?;
        }

        if parse_buf != 0 {
            let dict = self.dictionary;
            dict.tokenize(&mut self.memory, text_buf, parse_buf, &line, first_char)?;
        }
        Ok(13)
    }

    pub fn read_char_code(&mut self) -> Result<u16, Trap> {
        let ch = self.input.read_char()?;
        Ok(if ch == '\n' { 13 } else { ch as u16 })
    }

    // ---- misc services ----

    /// `random` opcode semantics: positive draws 1..=n, negative seeds
    /// with the operand, zero re-seeds unpredictably; both seeding forms
    /// yield 0.
    pub fn do_random(&mut self, range: i16) -> u16 {
        if range > 0 {
            self.rng.next(range as u16)
        } else if range < 0 {
            self.rng.seed(-(range as i64) as u64);
            0
        } else {
            self.rng.reseed();
            0
        }
    }

    /// `verify` opcode: checksum the load image against the header.
    pub fn verify(&self) -> bool {
        self.memory.checksum(self.header.file_len) == self.header.checksum
    }

    /// `restart` support: dynamic memory back to the load image, stacks
    /// and redirections cleared. Caches survive; code is immutable.
    pub fn restart(&mut self) {
        debug!("restart: resetting dynamic memory");
        self.memory.reset_dynamic();
        let (width, height) = self.screen.dimensions();
        self.memory.write_byte(0x20, height.min(255) as u8).ok();
        self.memory.write_byte(0x21, width.min(255) as u8).ok();
        self.stack.clear();
        self.stream3.clear();
        self.screen_stream_on = true;
        self.call_depth = 0;
    }

    // ---- top level ----

    /// Run to termination under the configured execution mode.
    pub fn run(&mut self) -> Result<Termination, FaultReport> {
        let result = loop {
            let r = match self.config.mode {
                ExecMode::Jit => crate::jit::run(self),
                ExecMode::Step => crate::interp::run(self),
            };
            match r {
                Err(Trap::Restart) => {
                    self.restart();
                    continue;
                }
                other => break other,
            }
        };
        self.screen.flush().ok();
        match result {
            Ok(()) => Ok(Termination::MainReturned),
            Err(Trap::Quit) => Ok(Termination::Quit),
            Err(Trap::Interrupted) => Ok(Termination::Interrupted),
            Err(Trap::Unwind { .. }) => Err(FaultReport {
                fault: Fault::UnmatchedThrow,
                addr: self.last_addr,
            }),
            Err(Trap::Restart) => unreachable!("restart handled above"),
            Err(Trap::Fault(fault)) => Err(FaultReport {
                fault,
                addr: self.last_addr,
            }),
        }
    }

    /// Captured screen output, when the screen records any.
    pub fn captured_output(&self) -> Option<String> {
        self.screen.captured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_round_trip() {
        let mut s = EvalStack::new(8);
        for v in [1u16, 2, 3, 4] {
            s.push(v).unwrap();
        }
        assert_eq!(s.sp(), 3);
        for v in [4u16, 3, 2, 1] {
            assert_eq!(s.pop().unwrap(), v);
        }
        assert_eq!(s.sp(), -1);
    }

    #[test]
    fn stack_boundary_faults_are_exact() {
        let mut s = EvalStack::new(2);
        s.push(10).unwrap();
        s.push(20).unwrap();
        // sp == capacity-1: push faults, nothing else does
        assert_eq!(s.push(30), Err(Fault::StackFull));
        assert_eq!(s.peek().unwrap(), 20);
        s.pop().unwrap();
        s.pop().unwrap();
        // sp == -1: pop/peek/set-top all fault
        assert_eq!(s.pop(), Err(Fault::StackEmpty));
        assert_eq!(s.peek(), Err(Fault::StackEmpty));
        assert_eq!(s.set_top(1), Err(Fault::StackEmpty));
    }

    #[test]
    fn stack_fault_messages() {
        assert_eq!(Fault::StackFull.to_string(), "Stack is full");
        assert_eq!(Fault::StackEmpty.to_string(), "Stack is empty");
    }

    #[test]
    fn set_top_replaces_without_moving() {
        let mut s = EvalStack::new(4);
        s.push(5).unwrap();
        s.set_top(9).unwrap();
        assert_eq!(s.sp(), 0);
        assert_eq!(s.pop().unwrap(), 9);
    }
}
