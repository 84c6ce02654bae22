//! Generators for the print and screen opcodes. Embedded text is
//! decompressed once at compile time; runtime-addressed strings decode
//! when printed.

use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::jit::dispatch::{ExitSpec, GenCtx, GenOut};
use crate::jit::ops::{Op, Src};
use crate::jit::reuse::Fuse;

pub fn print(ctx: &GenCtx, inst: &Instruction) -> Result<GenOut, Fault> {
    Ok(GenOut::one(Op::PrintLit {
        text: ctx.text(inst)?,
    }))
}

pub fn print_ret(ctx: &GenCtx, inst: &Instruction) -> Result<GenOut, Fault> {
    Ok(GenOut {
        ops: vec![
            Op::PrintLit {
                text: ctx.text(inst)?,
            },
            Op::NewLine,
        ],
        exit: Some(ExitSpec::Return(Src::Imm(1))),
    })
}

pub fn print_addr(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PrintAddr {
        addr: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn print_paddr(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PrintPaddr {
        addr: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn print_char(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PrintChar {
        ch: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn print_unicode(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    // Same service as print_char; the ZSCII mapping clamps the repertoire.
    print_char(ctx, inst, fuse)
}

pub fn print_num(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PrintNum {
        value: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn split_window(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SplitWindow {
        lines: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn set_window(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SetWindow {
        window: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn erase_window(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::EraseWindow {
        window: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn erase_line(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::EraseLine {
        value: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn set_cursor(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SetCursor {
        line: ctx.arg(inst, &srcs, 0)?,
        col: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn get_cursor(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::GetCursor {
        arr: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn set_text_style(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SetTextStyle {
        style: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn buffer_mode(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::BufferMode {
        flag: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn output_stream(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::OutputStream {
        stream: ctx.arg(inst, &srcs, 0)?,
        table: srcs.get(1).copied(),
    }))
}

pub fn input_stream(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::InputStream {
        stream: ctx.arg(inst, &srcs, 0)?,
    }))
}

pub fn sound_effect(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SoundEffect { args: srcs }))
}

pub fn set_colour(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::SetColour {
        fg: ctx.arg(inst, &srcs, 0)?,
        bg: ctx.arg(inst, &srcs, 1)?,
    }))
}

pub fn print_table(ctx: &GenCtx, inst: &Instruction, fuse: Fuse) -> Result<GenOut, Fault> {
    let srcs = ctx.srcs(inst, fuse);
    Ok(GenOut::one(Op::PrintTable {
        addr: ctx.arg(inst, &srcs, 0)?,
        width: ctx.arg(inst, &srcs, 1)?,
        height: srcs.get(2).copied().unwrap_or(Src::Imm(1)),
    }))
}
