//! Variable-length instruction decoding. `Instruction::decode` is a pure
//! function of memory and address; the machine memoizes results in an
//! `InstructionCache` because decoding is reused across routine
//! discovery, graph building and code generation.

use crate::fault::Fault;
use crate::memory::Memory;
use crate::opcode_tables;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter, Write as _};
use std::rc::Rc;

/// Operand addressing kinds, from the packed 2-bit type fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// 2-byte immediate
    LargeConstant,
    /// 1-byte immediate
    SmallConstant,
    /// variable number (0 = stack, 1-15 locals, 16-255 globals)
    Variable,
    Omitted,
}

impl OperandKind {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandKind::LargeConstant,
            0b01 => OperandKind::SmallConstant,
            0b10 => OperandKind::Variable,
            _ => OperandKind::Omitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub value: u16,
}

/// The four instruction shapes plus the V5+ extended form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

/// Opcode kind: the dispatch namespace an opcode number lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeKind {
    Op0,
    Op1,
    Op2,
    Var,
    Ext,
}

impl Display for OpcodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpcodeKind::Op0 => "0OP",
            OpcodeKind::Op1 => "1OP",
            OpcodeKind::Op2 => "2OP",
            OpcodeKind::Var => "VAR",
            OpcodeKind::Ext => "EXT",
        };
        f.write_str(s)
    }
}

/// Where a conditional branch goes when taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTarget {
    /// Offset relative to the end of the branch data, minus two.
    Offset(i16),
    ReturnTrue,
    ReturnFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchInfo {
    /// Branch when the condition is true (else when false).
    pub on_true: bool,
    pub target: BranchTarget,
}

/// One decoded instruction. Immutable once built; `addr + len` is the
/// address of the next instruction in linear order.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub addr: u32,
    pub len: usize,
    pub form: InstructionForm,
    pub kind: OpcodeKind,
    pub number: u8,
    pub operands: Vec<Operand>,
    pub store: Option<u8>,
    pub branch: Option<BranchInfo>,
    /// Embedded packed text, kept compressed; decoding it is the text
    /// collaborator's job.
    pub text: Option<Vec<u16>>,
}

impl Instruction {
    pub fn decode(mem: &Memory, addr: u32, version: u8) -> Result<Instruction, Fault> {
        let err = |at: u32, reason: &str| Fault::Decode {
            addr,
            reason: format!("{reason} at {at:#06x}"),
        };

        let mut at = addr;
        let opcode_byte = mem.read_byte(at)?;
        at += 1;

        let form = if opcode_byte == 0xBE && version >= 5 {
            InstructionForm::Extended
        } else {
            match opcode_byte >> 6 {
                0b11 => InstructionForm::Variable,
                0b10 => InstructionForm::Short,
                _ => InstructionForm::Long,
            }
        };

        let (kind, number) = match form {
            InstructionForm::Long => (OpcodeKind::Op2, opcode_byte & 0x1F),
            InstructionForm::Short => {
                let kind = if (opcode_byte >> 4) & 0x03 == 0x03 {
                    OpcodeKind::Op0
                } else {
                    OpcodeKind::Op1
                };
                (kind, opcode_byte & 0x0F)
            }
            InstructionForm::Variable => {
                let kind = if opcode_byte & 0x20 == 0 {
                    OpcodeKind::Op2
                } else {
                    OpcodeKind::Var
                };
                (kind, opcode_byte & 0x1F)
            }
            InstructionForm::Extended => {
                let ext = mem.read_byte(at)?;
                at += 1;
                (OpcodeKind::Ext, ext)
            }
        };

        // Operand types
        let mut kinds: Vec<OperandKind> = Vec::new();
        match form {
            InstructionForm::Long => {
                for bit in [0x40u8, 0x20] {
                    kinds.push(if opcode_byte & bit != 0 {
                        OperandKind::Variable
                    } else {
                        OperandKind::SmallConstant
                    });
                }
            }
            InstructionForm::Short => {
                if kind == OpcodeKind::Op1 {
                    let k = OperandKind::from_bits((opcode_byte >> 4) & 0x03);
                    if k != OperandKind::Omitted {
                        kinds.push(k);
                    }
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                // One type byte, or two for the double-length call forms.
                let double = kind == OpcodeKind::Var && matches!(number, 0x0C | 0x1A);
                let mut type_bytes = vec![mem.read_byte(at)?];
                at += 1;
                if double {
                    type_bytes.push(mem.read_byte(at)?);
                    at += 1;
                }
                'types: for tb in type_bytes {
                    for i in 0..4 {
                        let k = OperandKind::from_bits(tb >> (6 - i * 2));
                        if k == OperandKind::Omitted {
                            break 'types;
                        }
                        kinds.push(k);
                    }
                }
            }
        }

        // Operand values
        let mut operands = Vec::with_capacity(kinds.len());
        for k in kinds {
            let value = match k {
                OperandKind::LargeConstant => {
                    let v = mem.read_word(at)?;
                    at += 2;
                    v
                }
                OperandKind::SmallConstant | OperandKind::Variable => {
                    let v = mem.read_byte(at)? as u16;
                    at += 1;
                    v
                }
                OperandKind::Omitted => unreachable!(),
            };
            operands.push(Operand { kind: k, value });
        }

        let store = if opcode_tables::stores_result(kind, number, version) {
            let var = mem.read_byte(at)?;
            at += 1;
            Some(var)
        } else {
            None
        };

        let branch = if opcode_tables::has_branch(kind, number, version) {
            let first = mem.read_byte(at)?;
            at += 1;
            let on_true = first & 0x80 != 0;
            let raw = if first & 0x40 != 0 {
                // 1-byte form: 6-bit unsigned offset 0..63
                (first & 0x3F) as i16
            } else {
                // 2-byte form: 14-bit signed offset
                let second = mem.read_byte(at)?;
                at += 1;
                let mut v = (((first & 0x3F) as i16) << 8) | second as i16;
                if v & 0x2000 != 0 {
                    v |= 0xC000u16 as i16;
                }
                v
            };
            let target = match raw {
                0 => BranchTarget::ReturnFalse,
                1 => BranchTarget::ReturnTrue,
                n => BranchTarget::Offset(n),
            };
            Some(BranchInfo { on_true, target })
        } else {
            None
        };

        let text = if opcode_tables::has_text(kind, number) {
            let mut words = Vec::new();
            loop {
                let w = mem.read_word(at)?;
                at += 2;
                words.push(w);
                if w & 0x8000 != 0 {
                    break;
                }
            }
            Some(words)
        } else {
            None
        };

        if at as usize > mem.len() {
            return Err(err(at, "instruction runs off end of memory"));
        }

        Ok(Instruction {
            addr,
            len: (at - addr) as usize,
            form,
            kind,
            number,
            operands,
            store,
            branch,
            text,
        })
    }

    pub fn name(&self, version: u8) -> &'static str {
        opcode_tables::name(self.kind, self.number, version)
    }

    /// Address of the next instruction in linear decode order.
    pub fn next_addr(&self) -> u32 {
        self.addr + self.len as u32
    }

    /// Absolute address of the taken branch, when the branch targets an
    /// address rather than an immediate return.
    pub fn branch_target_addr(&self) -> Option<u32> {
        match self.branch {
            Some(BranchInfo {
                target: BranchTarget::Offset(off),
                ..
            }) => Some((self.next_addr() as i64 + off as i64 - 2) as u32),
            _ => None,
        }
    }

    pub fn is_jump(&self) -> bool {
        self.kind == OpcodeKind::Op1 && self.number == 0x0C
    }

    /// Absolute target of an unconditional `jump` with a constant
    /// operand. A computed jump target yields `None`.
    pub fn jump_target_addr(&self) -> Option<u32> {
        if !self.is_jump() {
            return None;
        }
        match self.operands.first() {
            Some(op) if op.kind != OperandKind::Variable => {
                Some((self.next_addr() as i64 + op.value as i16 as i64 - 2) as u32)
            }
            _ => None,
        }
    }

    /// Return/quit-class: control never reaches the lexically next
    /// instruction.
    pub fn is_terminal(&self, version: u8) -> bool {
        opcode_tables::is_terminal(self.kind, self.number, version)
    }
}

impl Instruction {
    /// Disassembly-style rendering, a debug aid.
    pub fn format_with_version(&self, version: u8) -> String {
        let mut out = String::from(self.name(version));
        for (i, op) in self.operands.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { ", " });
            match op.kind {
                OperandKind::Variable => write!(out, "{}", format_variable(op.value as u8)).unwrap(),
                _ => write!(out, "#{:04x}", op.value).unwrap(),
            }
        }
        if let Some(var) = self.store {
            write!(out, " -> {}", format_variable(var)).unwrap();
        }
        if let Some(ref b) = self.branch {
            let dest = match b.target {
                BranchTarget::ReturnFalse => "RFALSE".to_string(),
                BranchTarget::ReturnTrue => "RTRUE".to_string(),
                BranchTarget::Offset(_) => {
                    format!("{:#06x}", self.branch_target_addr().unwrap())
                }
            };
            write!(out, " [{}: {}]", if b.on_true { "TRUE" } else { "FALSE" }, dest).unwrap();
        }
        out
    }
}

pub fn format_variable(var: u8) -> String {
    match var {
        0x00 => "(SP)".to_string(),
        0x01..=0x0F => format!("L{:02x}", var - 1),
        _ => format!("G{:02x}", var - 0x10),
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_with_version(3))
    }
}

/// Address-keyed decode memo, owned by the machine (one per loaded story
/// image, never shared across images).
#[derive(Default)]
pub struct InstructionCache {
    map: HashMap<u32, Rc<Instruction>>,
}

impl InstructionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(
        &mut self,
        mem: &Memory,
        addr: u32,
        version: u8,
    ) -> Result<Rc<Instruction>, Fault> {
        if let Some(inst) = self.map.get(&addr) {
            return Ok(Rc::clone(inst));
        }
        let inst = Rc::new(Instruction::decode(mem, addr, version)?);
        self.map.insert(addr, Rc::clone(&inst));
        Ok(inst)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_from(code: &[u8]) -> Memory {
        let mut bytes = vec![0u8; 0x40];
        bytes.extend_from_slice(code);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        Memory::new(bytes, 0x40)
    }

    #[test]
    fn decode_long_form_branch() {
        // je #34 #78 [TRUE: RFALSE]
        let mem = mem_from(&[0x01, 0x34, 0x78, 0xC0]);
        let inst = Instruction::decode(&mem, 0x40, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Long);
        assert_eq!(inst.kind, OpcodeKind::Op2);
        assert_eq!(inst.number, 0x01);
        assert_eq!(inst.operands.len(), 2);
        assert_eq!(inst.operands[0].kind, OperandKind::SmallConstant);
        assert_eq!(inst.operands[0].value, 0x34);
        assert_eq!(inst.operands[1].value, 0x78);
        let b = inst.branch.unwrap();
        assert!(b.on_true);
        assert_eq!(b.target, BranchTarget::ReturnFalse);
        assert_eq!(inst.len, 4);
    }

    #[test]
    fn decode_short_form_jump() {
        // jump with a large-constant offset of +8
        let mem = mem_from(&[0x8C, 0x00, 0x08]);
        let inst = Instruction::decode(&mem, 0x40, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Short);
        assert_eq!(inst.kind, OpcodeKind::Op1);
        assert!(inst.is_jump());
        // target = 0x43 + 8 - 2
        assert_eq!(inst.jump_target_addr(), Some(0x49));
    }

    #[test]
    fn decode_variable_form_call() {
        // call_vs #1234 L00 L01 L02 -> (SP)
        let mem = mem_from(&[0xE0, 0x2A, 0x12, 0x34, 0x01, 0x02, 0x03, 0x00]);
        let inst = Instruction::decode(&mem, 0x40, 3).unwrap();
        assert_eq!(inst.kind, OpcodeKind::Var);
        assert_eq!(inst.number, 0x00);
        assert_eq!(inst.operands.len(), 4);
        assert_eq!(inst.operands[0].value, 0x1234);
        assert_eq!(inst.operands[0].kind, OperandKind::LargeConstant);
        assert_eq!(inst.operands[3].kind, OperandKind::Variable);
        assert_eq!(inst.store, Some(0x00));
    }

    #[test]
    fn decode_two_byte_branch_sign_extends() {
        // jz (SP) with a 14-bit negative offset (-4)
        let mem = mem_from(&[0xA0, 0x00, 0xBF, 0xFC]);
        let inst = Instruction::decode(&mem, 0x40, 3).unwrap();
        let b = inst.branch.unwrap();
        assert_eq!(b.target, BranchTarget::Offset(-4));
        // target = 0x44 + (-4) - 2 = 0x3e
        assert_eq!(inst.branch_target_addr(), Some(0x3E));
    }

    #[test]
    fn decode_embedded_text_stops_at_terminator() {
        // print "hi" (packed words built inline; second word terminates)
        let words = crate::text::encode_string("hi there");
        let mut code = vec![0xB2];
        for w in &words {
            code.extend_from_slice(&w.to_be_bytes());
        }
        let mem = mem_from(&code);
        let inst = Instruction::decode(&mem, 0x40, 3).unwrap();
        let payload = inst.text.clone().unwrap();
        assert_eq!(payload, words);
        assert_eq!(inst.len, 1 + 2 * words.len());
    }

    #[test]
    fn extended_form_needs_v5() {
        // log_shift #0004 #0001 -> (SP); in V3 the 0xBE byte is an
        // ordinary short-form opcode instead.
        let mem = mem_from(&[0xBE, 0x02, 0x5F, 0x04, 0x01, 0x00]);
        let inst3 = Instruction::decode(&mem, 0x40, 3).unwrap();
        assert_eq!(inst3.form, InstructionForm::Short);
        assert_eq!(inst3.kind, OpcodeKind::Op0);

        let inst5 = Instruction::decode(&mem, 0x40, 5).unwrap();
        assert_eq!(inst5.form, InstructionForm::Extended);
        assert_eq!(inst5.kind, OpcodeKind::Ext);
        assert_eq!(inst5.number, 0x02);
        assert_eq!(inst5.operands.len(), 2);
        assert_eq!(inst5.store, Some(0x00));
    }

    #[test]
    fn cache_returns_shared_instruction() {
        let mem = mem_from(&[0x41, 0x34, 0x78, 0xC0]);
        let mut cache = InstructionCache::new();
        let a = cache.decode(&mem, 0x40, 3).unwrap();
        let b = cache.decode(&mem, 0x40, 3).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn linear_decode_invariant() {
        // Consecutive instructions: add L00 L01 -> (SP); rtrue
        let mem = mem_from(&[0x74, 0x01, 0x02, 0x00, 0xB0]);
        let first = Instruction::decode(&mem, 0x40, 3).unwrap();
        let second = Instruction::decode(&mem, first.next_addr(), 3).unwrap();
        assert_eq!(first.next_addr(), first.addr + first.len as u32);
        assert_eq!(second.name(3), "rtrue");
    }
}
