//! Generators for the object-model opcodes: tree navigation, attribute
//! bits, and property-table access.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{GenCtx, GenOut};
use crate::jit::ops::{Cond, Op};
use crate::jit::reuse::Fuse;

pub fn get_prop(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::GetProp {
        obj: ctx.arg(inst, &srcs, 0)?,
        prop: ctx.arg(inst, &srcs, 1)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn get_prop_addr(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::GetPropAddr {
        obj: ctx.arg(inst, &srcs, 0)?,
        prop: ctx.arg(inst, &srcs, 1)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn get_next_prop(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::GetNextProp {
        obj: ctx.arg(inst, &srcs, 0)?,
        prop: ctx.arg(inst, &srcs, 1)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn get_prop_len(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::GetPropLen {
        addr: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn put_prop(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PutProp {
        obj: ctx.arg(inst, &srcs, 0)?,
        prop: ctx.arg(inst, &srcs, 1)?,
        value: ctx.arg(inst, &srcs, 2)?,
    }))
}

pub fn get_parent(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::GetParent {
        obj: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn get_child(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::GetChild {
        obj: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn get_sibling(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::GetSibling {
        obj: ctx.arg(inst, &srcs, 0)?,
        dest: ctx.dest(inst, fuse)?,
    }))
}

pub fn jin(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::Jin {
        child: ctx.arg(inst, &srcs, 0)?,
        parent: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn test_attr(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::branch(Cond::TestAttr {
        obj: ctx.arg(inst, &srcs, 0)?,
        attr: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn set_attr(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SetAttr {
        obj: ctx.arg(inst, &srcs, 0)?,
        attr: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn clear_attr(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::ClearAttr {
        obj: ctx.arg(inst, &srcs, 0)?,
        attr: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn insert_obj(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::InsertObj {
        obj: ctx.arg(inst, &srcs, 0)?,
        into: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn remove_obj(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::RemoveObj {
        obj: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn print_obj(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PrintObj {
        obj: ctx.arg(inst, &srcs, 0)?,
    }))
}
