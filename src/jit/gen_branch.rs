//! Generators for the pure branch opcodes and the unconditional jump.
//! Each emits a condition; the block compiler attaches the decoded
//! polarity and resolves the taken/fallthrough targets.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{GenCtx, GenOut};
use crate::jit::ops::Cond;
use crate::jit::reuse::Fuse;

pub fn jz(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::Jz {
        a: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn je(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    let a = ctx.arg(inst, &srcs, 0)?;
    // je takes 2-4 operands in VAR form; one comparand must exist.
    ctx.arg(inst, &srcs, 1)?;
    Ok(GenOut::branch(Cond::Je {
        a,
        others: srcs[1..].to_vec(),
    }))
}

pub fn jl(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::Jl {
        a: ctx.arg(inst, &srcs, 0)?,
        b: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn jg(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::Jg {
        a: ctx.arg(inst, &srcs, 0)?,
        b: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn dec_chk(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::DecChk {
        var: ctx.arg(inst, &srcs, 0)?,
        limit: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn inc_chk(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::IncChk {
        var: ctx.arg(inst, &srcs, 0)?,
        limit: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn test(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::Test {
        bitmap: ctx.arg(inst, &srcs, 0)?,
        flags: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn check_arg_count(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::ArgCountGe {
        n: ctx.arg(inst, &srcs, 0)?,
    }))
}
