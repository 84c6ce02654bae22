//! Generator selection: a static, version-aware mapping from
//! (kind, number, version) to the code generator for that opcode. No
//! reflection, no registry; a match is the whole table. Unrecognized
//! triples compile to an op that faults deterministically when (and
//! only when) it executes.

use crate::fault::Fault;
use crate::instruction::{Instruction, OpcodeKind, OperandKind};
use crate::jit::ops::{Cond, Dest, Op, Src};
use crate::jit::reuse::Fuse;
use crate::memory::Memory;
use crate::text;
use std::rc::Rc;

use super::{gen_branch, gen_display, gen_math, gen_memory, gen_misc, gen_object, gen_stack};

/// Everything a generator may consult. Immutable during generation.
pub struct GenCtx<'a> {
    pub version: u8,
    pub mem: &'a Memory,
    pub abbrev_table: u16,
}

/// Where a generator sends control, in instruction-address terms; the
/// block compiler resolves addresses to block indices.
pub enum ExitSpec {
    /// Conditional branch; polarity and target come off the decoded
    /// instruction.
    Branch(Cond),
    /// Unconditional `jump`; target comes off the instruction.
    Jump,
    Return(Src),
    Quit,
    Restart,
    Throw { value: Src, frame: Src },
}

pub struct GenOut {
    pub ops: Vec<Op>,
    pub exit: Option<ExitSpec>,
}

impl GenOut {
    pub fn one(op: Op) -> GenOut {
        GenOut {
            ops: vec![op],
            exit: None,
        }
    }

    pub fn exit(spec: ExitSpec) -> GenOut {
        GenOut {
            ops: Vec::new(),
            exit: Some(spec),
        }
    }

    pub fn branch(cond: Cond) -> GenOut {
        GenOut::exit(ExitSpec::Branch(cond))
    }
}

impl<'a> GenCtx<'a> {
    /// Map decoded operands to pre-resolved sources. Under a reuse plan,
    /// the first stack operand reads the accumulator instead of popping.
    pub fn srcs(&self, inst: &Instruction, fuse: Fuse) -> Vec<Src> {
        let mut accum_spent = !fuse.load;
        inst.operands
            .iter()
            .map(|o| match o.kind {
                OperandKind::Variable if o.value == 0 && !accum_spent => {
                    accum_spent = true;
                    Src::Accum
                }
                OperandKind::Variable => Src::Var(o.value as u8),
                _ => Src::Imm(o.value),
            })
            .collect()
    }

    /// Operand `i`, faulting on malformed operand counts.
    pub fn arg(&self, inst: &Instruction, srcs: &[Src], i: usize) -> Result<Src, Fault> {
        srcs.get(i).copied().ok_or_else(|| Fault::Decode {
            addr: inst.addr,
            reason: format!(
                "{} needs at least {} operand(s)",
                inst.name(self.version),
                i + 1
            ),
        })
    }

    /// The store target; the opcode tables guarantee its presence for
    /// any opcode whose generator asks.
    pub fn dest(&self, inst: &Instruction, fuse: Fuse) -> Result<Dest, Fault> {
        let var = inst.store.ok_or_else(|| Fault::Decode {
            addr: inst.addr,
            reason: format!("{} carries no store target", inst.name(self.version)),
        })?;
        Ok(if fuse.store && var == 0 {
            Dest::Accum
        } else {
            Dest::Var(var)
        })
    }

    /// The decoded embedded text payload, decompressed for generation.
    pub fn text(&self, inst: &Instruction) -> Result<Rc<str>, Fault> {
        let words = inst.text.as_ref().ok_or_else(|| Fault::Decode {
            addr: inst.addr,
            reason: "print opcode without text payload".to_string(),
        })?;
        let s = text::decode_payload(words, self.mem, self.abbrev_table)?;
        Ok(Rc::from(s.as_str()))
    }
}

fn unknown(inst: &Instruction) -> GenOut {
    GenOut::one(Op::Unknown {
        kind: inst.kind,
        number: inst.number,
    })
}

/// The dispatch table.
pub fn generate(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let v = ctx.version;
    match (inst.kind, inst.number) {
        // ---- 2OP ----
        (OpcodeKind::Op2, 0x01) => gen_branch::je(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x02) => gen_branch::jl(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x03) => gen_branch::jg(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x04) => gen_branch::dec_chk(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x05) => gen_branch::inc_chk(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x06) => gen_object::jin(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x07) => gen_branch::test(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x08) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::Or),
        (OpcodeKind::Op2, 0x09) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::And),
        (OpcodeKind::Op2, 0x0A) => gen_object::test_attr(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x0B) => gen_object::set_attr(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x0C) => gen_object::clear_attr(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x0D) => gen_memory::store(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x0E) => gen_object::insert_obj(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x0F) => gen_memory::loadw(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x10) => gen_memory::loadb(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x11) => gen_object::get_prop(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x12) => gen_object::get_prop_addr(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x13) => gen_object::get_next_prop(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x14) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::Add),
        (OpcodeKind::Op2, 0x15) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::Sub),
        (OpcodeKind::Op2, 0x16) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::Mul),
        (OpcodeKind::Op2, 0x17) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::Div),
        (OpcodeKind::Op2, 0x18) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::Mod),
        (OpcodeKind::Op2, 0x19) if v >= 4 => gen_stack::call(ctx, inst, fuse, true),
        (OpcodeKind::Op2, 0x1A) if v >= 5 => gen_stack::call(ctx, inst, fuse, false),
        (OpcodeKind::Op2, 0x1B) if v >= 5 => gen_display::set_colour(ctx, inst, fuse),
        (OpcodeKind::Op2, 0x1C) if v >= 5 => gen_stack::throw(ctx, inst, fuse),

        // ---- 1OP ----
        (OpcodeKind::Op1, 0x00) => gen_branch::jz(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x01) => gen_object::get_sibling(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x02) => gen_object::get_child(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x03) => gen_object::get_parent(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x04) => gen_object::get_prop_len(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x05) => gen_memory::inc(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x06) => gen_memory::dec(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x07) => gen_display::print_addr(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x08) if v >= 4 => gen_stack::call(ctx, inst, fuse, true),
        (OpcodeKind::Op1, 0x09) => gen_object::remove_obj(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x0A) => gen_object::print_obj(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x0B) => gen_stack::ret(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x0C) => Ok(GenOut::exit(ExitSpec::Jump)),
        (OpcodeKind::Op1, 0x0D) => gen_display::print_paddr(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x0E) => gen_memory::load(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x0F) if v <= 4 => gen_math::not(ctx, inst, fuse),
        (OpcodeKind::Op1, 0x0F) => gen_stack::call(ctx, inst, fuse, false),

        // ---- 0OP ----
        (OpcodeKind::Op0, 0x00) => Ok(GenOut::exit(ExitSpec::Return(Src::Imm(1)))),
        (OpcodeKind::Op0, 0x01) => Ok(GenOut::exit(ExitSpec::Return(Src::Imm(0)))),
        (OpcodeKind::Op0, 0x02) => gen_display::print(ctx, inst),
        (OpcodeKind::Op0, 0x03) => gen_display::print_ret(ctx, inst),
        (OpcodeKind::Op0, 0x04) => Ok(GenOut::one(Op::Nop)),
        (OpcodeKind::Op0, 0x05 | 0x06) if v <= 3 => Ok(GenOut::branch(Cond::Never)),
        (OpcodeKind::Op0, 0x05 | 0x06) if v == 4 => gen_misc::save_stub(ctx, inst, fuse),
        (OpcodeKind::Op0, 0x07) => Ok(GenOut::exit(ExitSpec::Restart)),
        (OpcodeKind::Op0, 0x08) => Ok(GenOut::exit(ExitSpec::Return(Src::Var(0)))),
        (OpcodeKind::Op0, 0x09) if v <= 4 => Ok(GenOut::one(Op::PopDiscard)),
        (OpcodeKind::Op0, 0x09) => gen_stack::catch(ctx, inst, fuse),
        (OpcodeKind::Op0, 0x0A) => Ok(GenOut::exit(ExitSpec::Quit)),
        (OpcodeKind::Op0, 0x0B) => Ok(GenOut::one(Op::NewLine)),
        (OpcodeKind::Op0, 0x0C) if v == 3 => Ok(GenOut::one(Op::ShowStatus)),
        (OpcodeKind::Op0, 0x0D) => Ok(GenOut::branch(Cond::Verify)),
        (OpcodeKind::Op0, 0x0F) if v >= 5 => Ok(GenOut::branch(Cond::Always)),

        // ---- VAR ----
        (OpcodeKind::Var, 0x00) => gen_stack::call(ctx, inst, fuse, true),
        (OpcodeKind::Var, 0x01) => gen_memory::storew(ctx, inst, fuse),
        (OpcodeKind::Var, 0x02) => gen_memory::storeb(ctx, inst, fuse),
        (OpcodeKind::Var, 0x03) => gen_object::put_prop(ctx, inst, fuse),
        (OpcodeKind::Var, 0x04) => gen_misc::read(ctx, inst, fuse),
        (OpcodeKind::Var, 0x05) => gen_display::print_char(ctx, inst, fuse),
        (OpcodeKind::Var, 0x06) => gen_display::print_num(ctx, inst, fuse),
        (OpcodeKind::Var, 0x07) => gen_misc::random(ctx, inst, fuse),
        (OpcodeKind::Var, 0x08) => gen_stack::push(ctx, inst, fuse),
        (OpcodeKind::Var, 0x09) => gen_stack::pull(ctx, inst, fuse),
        (OpcodeKind::Var, 0x0A) if v >= 3 => gen_display::split_window(ctx, inst, fuse),
        (OpcodeKind::Var, 0x0B) if v >= 3 => gen_display::set_window(ctx, inst, fuse),
        (OpcodeKind::Var, 0x0C) if v >= 4 => gen_stack::call(ctx, inst, fuse, true),
        (OpcodeKind::Var, 0x0D) if v >= 4 => gen_display::erase_window(ctx, inst, fuse),
        (OpcodeKind::Var, 0x0E) if v >= 4 => gen_display::erase_line(ctx, inst, fuse),
        (OpcodeKind::Var, 0x0F) if v >= 4 => gen_display::set_cursor(ctx, inst, fuse),
        (OpcodeKind::Var, 0x10) if v >= 4 => gen_display::get_cursor(ctx, inst, fuse),
        (OpcodeKind::Var, 0x11) if v >= 4 => gen_display::set_text_style(ctx, inst, fuse),
        (OpcodeKind::Var, 0x12) if v >= 4 => gen_display::buffer_mode(ctx, inst, fuse),
        (OpcodeKind::Var, 0x13) if v >= 3 => gen_display::output_stream(ctx, inst, fuse),
        (OpcodeKind::Var, 0x14) if v >= 3 => gen_display::input_stream(ctx, inst, fuse),
        (OpcodeKind::Var, 0x15) if v >= 3 => gen_display::sound_effect(ctx, inst, fuse),
        (OpcodeKind::Var, 0x16) if v >= 4 => gen_misc::read_char(ctx, inst, fuse),
        (OpcodeKind::Var, 0x17) if v >= 4 => gen_memory::scan_table(ctx, inst, fuse),
        (OpcodeKind::Var, 0x18) if v >= 5 => gen_math::not(ctx, inst, fuse),
        (OpcodeKind::Var, 0x19 | 0x1A) if v >= 5 => gen_stack::call(ctx, inst, fuse, false),
        (OpcodeKind::Var, 0x1B) if v >= 5 => gen_memory::tokenise(ctx, inst, fuse),
        (OpcodeKind::Var, 0x1C) if v >= 5 => gen_memory::encode_text(ctx, inst, fuse),
        (OpcodeKind::Var, 0x1D) if v >= 5 => gen_memory::copy_table(ctx, inst, fuse),
        (OpcodeKind::Var, 0x1E) if v >= 5 => gen_display::print_table(ctx, inst, fuse),
        (OpcodeKind::Var, 0x1F) if v >= 5 => gen_branch::check_arg_count(ctx, inst, fuse),

        // ---- EXT ----
        (OpcodeKind::Ext, 0x00 | 0x01) => gen_misc::save_stub(ctx, inst, fuse),
        (OpcodeKind::Ext, 0x02) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::LogShift),
        (OpcodeKind::Ext, 0x03) => gen_math::binary(ctx, inst, fuse, super::ops::BinOp::ArtShift),
        (OpcodeKind::Ext, 0x04) => gen_misc::set_font(ctx, inst, fuse),
        (OpcodeKind::Ext, 0x09) => gen_misc::save_undo(ctx, inst, fuse),
        (OpcodeKind::Ext, 0x0A) => gen_misc::restore_undo(ctx, inst, fuse),
        (OpcodeKind::Ext, 0x0B) => gen_display::print_unicode(ctx, inst, fuse),
        (OpcodeKind::Ext, 0x0C) => gen_misc::check_unicode(ctx, inst, fuse),

        _ => Ok(unknown(inst)),
    }
}
