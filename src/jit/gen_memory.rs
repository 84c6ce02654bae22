//! Generators for memory and variable-plumbing opcodes: table loads and
//! stores, the indirect variable forms, and the V5 table utilities.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{GenCtx, GenOut};
use crate::jit::ops::{Cond, Op};
use crate::jit::reuse::Fuse;

pub fn loadw(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::LoadW {
        arr: ctx.arg(inst, &srcs, 0)?,
        idx: ctx.arg(inst, &srcs, 1)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn loadb(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::LoadB {
        arr: ctx.arg(inst, &srcs, 0)?,
        idx: ctx.arg(inst, &srcs, 1)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn storew(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::StoreW {
        arr: ctx.arg(inst, &srcs, 0)?,
        idx: ctx.arg(inst, &srcs, 1)?,
        value: ctx.arg(inst, &srcs, 2)?,
    }))
}

pub fn storeb(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::StoreB {
        arr: ctx.arg(inst, &srcs, 0)?,
        idx: ctx.arg(inst, &srcs, 1)?,
        value: ctx.arg(inst, &srcs, 2)?,
    }))
}

/// `load`: indirect variable read.
pub fn load(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::LoadVar {
        var: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

/// `store`: indirect variable write.
pub fn store(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::StoreVar {
        var: ctx.arg(inst, &srcs, 0)?,
        value: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn inc(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::IncVar {
        var: ctx.arg(inst, &srcs, 0)?,
        delta: 1,
    }))
}

pub fn dec(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::IncVar {
        var: ctx.arg(inst, &srcs, 0)?,
        delta: -1,
    }))
}

pub fn copy_table(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::CopyTable {
        first: ctx.arg(inst, &srcs, 0)?,
        second: ctx.arg(inst, &srcs, 1)?,
        size: ctx.arg(inst, &srcs, 2)?,
    }))
}

pub fn scan_table(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::ScanTable {
        x: ctx.arg(inst, &srcs, 0)?,
        table: ctx.arg(inst, &srcs, 1)?,
        len: ctx.arg(inst, &srcs, 2)?,
        form: srcs.get(3).copied(),
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn tokenise(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::Tokenise {
        text: ctx.arg(inst, &srcs, 0)?,
        parse: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn encode_text(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::EncodeText {
        text: ctx.arg(inst, &srcs, 0)?,
        len: ctx.arg(inst, &srcs, 1)?,
        from: ctx.arg(inst, &srcs, 2)?,
        coded: ctx.arg(inst, &srcs, 3)?,
    }))
}
