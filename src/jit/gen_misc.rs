//! Generators for input, randomness, and the leftovers: the persistence
//! stubs and version-5 odds and ends.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{GenCtx, GenOut};
use crate::jit::ops::Op;
use crate::jit::reuse::Fuse;

pub fn random(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::Random {
        range: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

/// sread/aread. The V4 timed-input operands are accepted and ignored;
/// V5+ stores the terminating character.
pub fn read(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    let text = ctx.arg(inst, &srcs, 0)?;
    let parse = srcs.get(1).copied().unwrap_or(crate::jit::ops::Src::Imm(0));
    let dest = if ctx.version >= 5 {
        Some(ctx.dest(inst, fuse)?)
    } else {
        None
    };
    Ok(GenOut::one(Op::Read {
        text,
        parse,
        extra: srcs.get(2..).unwrap_or_default().to_vec(),
        dest,
    }))
}

pub fn read_char(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    // The "1" operand and the timed-read operands carry no meaning here,
    // but their stack effects must still happen.
    Ok(GenOut::one(Op::ReadChar {
        args: ctx.srcs(inst, fuse),
        dest: ctx.dest(inst, fuse)?,
    }))
}

/// V4/V5 save and restore store-forms: persistence is a collaborator
/// this runtime does not carry, so both store the documented failure.
pub fn save_stub(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    Ok(GenOut::one(Op::StoreConst {
        value: 0,
        dest: ctx.dest(inst, fuse)?,
    }))
}

/// save_undo stores -1: "the interpreter does not provide undo".
pub fn save_undo(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    Ok(GenOut::one(Op::StoreConst {
        value: 0xFFFF,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn restore_undo(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    Ok(GenOut::one(Op::StoreConst {
        value: 0,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn set_font(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SetFont {
        font: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn check_unicode(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    // ASCII repertoire only: printable, not readable.
    Ok(GenOut::one(Op::StoreConst {
        value: 1,
        dest: ctx.dest(inst, fuse)?,
    }))
}
