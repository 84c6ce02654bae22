//! Routine discovery. A routine is found lazily on first call: read the
//! locals header, then decode forward until the watermark rule proves no
//! more bytes are reachable.

use crate::fault::Fault;
use crate::instruction::{Instruction, InstructionCache};
use crate::memory::Memory;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// Safety valve against scanning off into data on malformed images.
const MAX_ROUTINE_INSTRUCTIONS: usize = 20_000;

/// A callable bytecode procedure: locals header plus instruction stream.
pub struct Routine {
    pub addr: u32,
    pub num_locals: u8,
    /// V1-4 carry initial local values in the header; V5+ locals start
    /// at zero.
    pub local_defaults: Vec<u16>,
    /// First instruction address (after the header, if any).
    pub code_start: u32,
    pub instructions: Vec<Rc<Instruction>>,
    /// Debug label; not semantically load-bearing.
    pub name: RefCell<String>,
}

impl Routine {
    /// Distance from the routine address to the end of its last
    /// instruction.
    pub fn len(&self) -> usize {
        match self.instructions.last() {
            Some(last) => (last.next_addr() - self.addr) as usize,
            None => (self.code_start - self.addr) as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Build a routine at `addr`, reading the locals header first.
    pub fn build(
        mem: &Memory,
        cache: &mut InstructionCache,
        addr: u32,
        version: u8,
    ) -> Result<Routine, Fault> {
        let num_locals = mem.read_byte(addr)?;
        if num_locals > 15 {
            return Err(Fault::Decode {
                addr,
                reason: format!("routine header claims {num_locals} locals"),
            });
        }

        let mut code_start = addr + 1;
        let mut local_defaults = vec![0u16; num_locals as usize];
        if version <= 4 {
            for slot in local_defaults.iter_mut() {
                *slot = mem.read_word(code_start)?;
                code_start += 2;
            }
        }

        let instructions = scan_instructions(mem, cache, code_start, version)?;
        Ok(Routine {
            addr,
            num_locals,
            local_defaults,
            code_start,
            instructions,
            name: RefCell::new(format!("R{addr:05x}")),
        })
    }

    /// Build the entry pseudo-routine for V1-5 stories, whose initial PC
    /// points straight at an instruction with no locals header.
    pub fn build_main(
        mem: &Memory,
        cache: &mut InstructionCache,
        addr: u32,
        version: u8,
    ) -> Result<Routine, Fault> {
        let instructions = scan_instructions(mem, cache, addr, version)?;
        Ok(Routine {
            addr,
            num_locals: 0,
            local_defaults: Vec::new(),
            code_start: addr,
            instructions,
            name: RefCell::new("main".to_string()),
        })
    }
}

/// Linear decode with the watermark termination rule: track the highest
/// branch/jump target seen, and stop at a return/quit-class instruction
/// only once decode has moved past that watermark. This tolerates forward
/// branches past apparent routine ends and backward jumps over dead code.
fn scan_instructions(
    mem: &Memory,
    cache: &mut InstructionCache,
    code_start: u32,
    version: u8,
) -> Result<Vec<Rc<Instruction>>, Fault> {
    let mut instructions = Vec::new();
    let mut at = code_start;
    let mut watermark = code_start;

    loop {
        let inst = cache.decode(mem, at, version)?;
        at = inst.next_addr();

        for target in [inst.branch_target_addr(), inst.jump_target_addr()]
            .into_iter()
            .flatten()
        {
            if target > watermark {
                watermark = target;
            }
        }

        let terminal = inst.is_terminal(version);
        instructions.push(inst);

        if terminal && at > watermark {
            break;
        }
        if instructions.len() >= MAX_ROUTINE_INSTRUCTIONS {
            return Err(Fault::Decode {
                addr: code_start,
                reason: "routine scan exceeded instruction limit".to_string(),
            });
        }
    }

    debug!(
        "routine scan at {:#06x}: {} instructions, end {:#06x}",
        code_start,
        instructions.len(),
        at
    );
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn mem_from(code: &[u8]) -> Memory {
        let mut bytes = vec![0u8; 0x40];
        bytes.extend_from_slice(code);
        bytes.resize(bytes.len() + 8, 0);
        Memory::new(bytes, 0x40)
    }

    #[test]
    fn reads_v3_locals_header() {
        // 2 locals with defaults 0x0005 and 0x0a00, then rtrue
        let r = {
            let mem = mem_from(&[0x02, 0x00, 0x05, 0x0A, 0x00, 0xB0]);
            let mut cache = InstructionCache::new();
            Routine::build(&mem, &mut cache, 0x40, 3).unwrap()
        };
        assert_eq!(r.num_locals, 2);
        assert_eq!(r.local_defaults, vec![0x0005, 0x0A00]);
        assert_eq!(r.code_start, 0x45);
        assert_eq!(r.instructions.len(), 1);
        assert_eq!(r.len(), 6);
    }

    #[test]
    fn v5_locals_have_no_default_words() {
        let mem = mem_from(&[0x03, 0xB0]);
        let mut cache = InstructionCache::new();
        let r = Routine::build(&mem, &mut cache, 0x40, 5).unwrap();
        assert_eq!(r.num_locals, 3);
        assert_eq!(r.local_defaults, vec![0, 0, 0]);
        assert_eq!(r.code_start, 0x41);
        assert_eq!(r.instructions.len(), 1);
    }

    #[test]
    fn rejects_bogus_locals_count() {
        let mem = mem_from(&[0x20, 0xB0]);
        let mut cache = InstructionCache::new();
        assert!(matches!(
            Routine::build(&mem, &mut cache, 0x40, 3),
            Err(Fault::Decode { .. })
        ));
    }

    #[test]
    fn watermark_scans_past_apparent_end() {
        // 0 locals:
        //   0x41: jz (SP) [TRUE: 0x48]   (branch over the rtrue)
        //   0x45: rtrue                  (apparent end, but watermark=0x48)
        //   0x46: nop
        //   0x47: nop
        //   0x48: rfalse                 (real end)
        let mem = mem_from(&[
            0x00, // locals
            0xA0, 0x00, 0xBF, 0xFF, // jz (SP), 2-byte branch, raw offset…
            0xB0, // rtrue
            0xB4, // nop
            0xB4, // nop
            0xB1, // rfalse
        ]);
        // Patch branch bytes for offset +5: target = 0x45 + 5 - 2 = 0x48.
        // Two-byte form, on_true: 0x80 | 0x00, low byte 0x05.
        let mem = {
            let mut bytes = mem.bytes().to_vec();
            bytes[0x43] = 0x80;
            bytes[0x44] = 0x05;
            Memory::new(bytes, 0x40)
        };
        let mut cache = InstructionCache::new();
        let r = Routine::build(&mem, &mut cache, 0x40, 3).unwrap();
        let names: Vec<&str> = r.instructions.iter().map(|i| i.name(3)).collect();
        assert_eq!(names, vec!["jz", "rtrue", "nop", "nop", "rfalse"]);
    }

    #[test]
    fn backward_jump_ends_scan() {
        // 0x41: nop
        // 0x42: jump back to 0x41 (offset -1: target = 0x45 + (-4) - 2… )
        let mem = mem_from(&[
            0x00, // locals
            0xB4, // nop
            0x8C, 0xFF, 0xFC, // jump -4 => target 0x45 - 4 - 2 = 0x3f… adjust below
        ]);
        let mut cache = InstructionCache::new();
        let r = Routine::build(&mem, &mut cache, 0x40, 3).unwrap();
        // jump is terminal and its backward target never raises the
        // watermark, so the scan stops right after it.
        assert_eq!(r.instructions.len(), 2);
        assert_eq!(r.instructions[1].name(3), "jump");
    }

    #[test]
    fn main_routine_has_no_header() {
        let mem = mem_from(&[0xB4, 0xB0]);
        let mut cache = InstructionCache::new();
        let r = Routine::build_main(&mem, &mut cache, 0x40, 3).unwrap();
        assert_eq!(r.num_locals, 0);
        assert_eq!(r.code_start, 0x40);
        assert_eq!(r.instructions.len(), 2);
        assert_eq!(*r.name.borrow(), "main");
    }
}
