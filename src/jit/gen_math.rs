//! Generators for arithmetic and bitwise opcodes. All signed arithmetic
//! is 16-bit wraparound: operands sign-extend, results truncate.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{GenCtx, GenOut};
use crate::jit::ops::{BinOp, Op};
use crate::jit::reuse::Fuse;

pub fn binary(ctx: &GenCtx, inst: &Instruction, fuse: Fuse, op: BinOp) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::Binary {
        op,
        a: ctx.arg(inst, &srcs, 0)?,
        b: ctx.arg(inst, &srcs, 1)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn not(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::Not {
        a: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}
