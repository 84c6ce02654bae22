//! Generators for calls, returns, and explicit stack opcodes. All eight
//! call forms funnel into one `Op::Call`; whether a store target exists
//! is the only difference the generated code sees.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{ExitSpec, GenCtx, GenOut};
use crate::jit::ops::Op;
use crate::jit::reuse::Fuse;

pub fn call(ctx: &GenCtx, inst: &Instruction, fuse: Fuse, stores: bool) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    let routine = ctx.arg(inst, &srcs, 0)?;
    let args = srcs[1..].to_vec();
    let dest = if stores {
        Some(ctx.dest(inst, fuse)?)
    } else {
        None
    };
    Ok(GenOut::one(Op::Call {
        routine,
        args,
        dest,
    }))
}

pub fn ret(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::exit(ExitSpec::Return(ctx.arg(inst, &srcs, 0)?)))
}

pub fn push(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::Push {
        value: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn pull(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::Pull {
        var: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn catch(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    Ok(GenOut::one(Op::Catch {
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn throw(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::exit(ExitSpec::Throw {
        value: ctx.arg(inst, &srcs, 0)?,
        frame: ctx.arg(inst, &srcs, 1)?,
    }))
}
