//! The compiled representation: one unit per routine, blocks of
//! pre-resolved operations with typed exits, executed by a threaded
//! dispatch loop. The operations call into the machine's runtime
//! services and must reproduce, in order, exactly the memory, stack and
//! variable effects a direct interpreter would produce.

use crate::fault::{Fault, Trap};
use crate::instruction::OpcodeKind;
use crate::machine::Machine;
use std::rc::Rc;

/// A pre-resolved operand. `Accum` is the operand-reuse hand-off slot;
/// it only appears where the reuse plan proved the push/pop pair away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Src {
    Imm(u16),
    Var(u8),
    Accum,
}

/// A pre-resolved store target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Var(u8),
    Accum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    LogShift,
    ArtShift,
}

/// Straight-line operations.
#[derive(Debug, Clone)]
pub enum Op {
    Binary { op: BinOp, a: Src, b: Src, dest: Dest },
    Not { a: Src, dest: Dest },

    // variable plumbing (indirect forms resolve the index at runtime)
    LoadVar { var: Src, dest: Dest },
    StoreVar { var: Src, value: Src },
    IncVar { var: Src, delta: i16 },

    // memory
    LoadW { arr: Src, idx: Src, dest: Dest },
    LoadB { arr: Src, idx: Src, dest: Dest },
    StoreW { arr: Src, idx: Src, value: Src },
    StoreB { arr: Src, idx: Src, value: Src },
    CopyTable { first: Src, second: Src, size: Src },
    PrintTable { addr: Src, width: Src, height: Src },

    // object model
    GetProp { obj: Src, prop: Src, dest: Dest },
    GetPropAddr { obj: Src, prop: Src, dest: Dest },
    GetNextProp { obj: Src, prop: Src, dest: Dest },
    GetPropLen { addr: Src, dest: Dest },
    PutProp { obj: Src, prop: Src, value: Src },
    GetParent { obj: Src, dest: Dest },
    InsertObj { obj: Src, into: Src },
    RemoveObj { obj: Src },
    SetAttr { obj: Src, attr: Src },
    ClearAttr { obj: Src, attr: Src },
    PrintObj { obj: Src },

    // calls and stack
    Call { routine: Src, args: Vec<Src>, dest: Option<Dest> },
    Push { value: Src },
    Pull { var: Src },
    PopDiscard,
    Catch { dest: Dest },

    // output
    PrintLit { text: Rc<str> },
    NewLine,
    PrintAddr { addr: Src },
    PrintPaddr { addr: Src },
    PrintChar { ch: Src },
    PrintNum { value: Src },
    SplitWindow { lines: Src },
    SetWindow { window: Src },
    EraseWindow { window: Src },
    EraseLine { value: Src },
    SetCursor { line: Src, col: Src },
    GetCursor { arr: Src },
    SetTextStyle { style: Src },
    BufferMode { flag: Src },
    OutputStream { stream: Src, table: Option<Src> },
    InputStream { stream: Src },
    SoundEffect { args: Vec<Src> },
    ShowStatus,
    SetColour { fg: Src, bg: Src },

    // input and misc services
    Read {
        text: Src,
        parse: Src,
        /// V4 timed-read operands: evaluated for their stack effects,
        /// then ignored.
        extra: Vec<Src>,
        dest: Option<Dest>,
    },
    ReadChar { args: Vec<Src>, dest: Dest },
    Random { range: Src, dest: Dest },
    Tokenise { text: Src, parse: Src },
    EncodeText { text: Src, len: Src, from: Src, coded: Src },
    StoreConst { value: u16, dest: Dest },
    SetFont { font: Src, dest: Dest },
    Nop,

    /// Decode succeeded but no generator exists for this opcode triple;
    /// executing it is a deterministic fault.
    Unknown { kind: OpcodeKind, number: u8 },
}

/// Branch conditions, evaluated at block exits. A few opcodes both store
/// and branch; their store happens inside the condition so the effect
/// order matches the interpreter exactly.
#[derive(Debug, Clone)]
pub enum Cond {
    Jz { a: Src },
    Je { a: Src, others: Vec<Src> },
    Jl { a: Src, b: Src },
    Jg { a: Src, b: Src },
    DecChk { var: Src, limit: Src },
    IncChk { var: Src, limit: Src },
    Jin { child: Src, parent: Src },
    Test { bitmap: Src, flags: Src },
    TestAttr { obj: Src, attr: Src },
    GetChild { obj: Src, dest: Dest },
    GetSibling { obj: Src, dest: Dest },
    ScanTable { x: Src, table: Src, len: Src, form: Option<Src>, dest: Dest },
    ArgCountGe { n: Src },
    Verify,
    /// piracy: report genuine.
    Always,
    /// V1-3 save/restore stubs: report failure.
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTarget {
    Block(usize),
    ReturnTrue,
    ReturnFalse,
}

/// How a block ends.
#[derive(Debug, Clone)]
pub enum BlockExit {
    Jump(usize),
    Branch {
        cond: Cond,
        on_true: bool,
        taken: ExitTarget,
        fall: usize,
    },
    Return(Src),
    Quit,
    Restart,
    Throw { value: Src, frame: Src },
    /// `jump` through a variable; the target is unknowable at compile
    /// time and executing it faults.
    ComputedJump,
    /// Dead-end block (tolerated at compile time, fault at runtime).
    NoExit,
}

/// An op tagged with the address of the instruction it came from, for
/// fault reports and hooks.
#[derive(Debug, Clone)]
pub struct CompiledOp {
    pub addr: u32,
    pub op: Op,
}

#[derive(Debug, Clone)]
pub struct CompiledBlock {
    pub start: u32,
    pub ops: Vec<CompiledOp>,
    pub exit: BlockExit,
    /// Address of the instruction the exit came from.
    pub exit_addr: u32,
}

/// One routine's compiled unit. Immutable once built; cached by address.
#[derive(Debug)]
pub struct CompiledRoutine {
    pub addr: u32,
    pub num_locals: u8,
    pub local_defaults: Vec<u16>,
    pub blocks: Vec<CompiledBlock>,
    pub entry: usize,
}

/// Per-invocation state: the local variables live in the native frame,
/// which is how the compiled path realizes the story's call stack.
struct Frame {
    locals: [u16; 15],
    num_locals: u8,
    arg_count: u8,
    accum: u16,
    /// `m.call_depth` at entry; catch/throw tokens refer to this.
    depth: usize,
    /// Evaluation-stack depth at entry; restored on return.
    stack_base: usize,
}

impl Frame {
    fn new(unit: &CompiledRoutine, args: &[u16], depth: usize, stack_base: usize) -> Frame {
        let mut locals = [0u16; 15];
        for (i, d) in unit.local_defaults.iter().enumerate() {
            locals[i] = *d;
        }
        let n = args.len().min(unit.num_locals as usize);
        locals[..n].copy_from_slice(&args[..n]);
        Frame {
            locals,
            num_locals: unit.num_locals,
            arg_count: args.len() as u8,
            accum: 0,
            depth,
            stack_base,
        }
    }
}

fn signed(v: u16) -> i16 {
    v as i16
}

fn read_var(m: &mut Machine, f: &mut Frame, var: u8) -> Result<u16, Fault> {
    match var {
        0x00 => m.stack.pop(),
        0x01..=0x0F => {
            let index = (var - 1) as usize;
            if index >= f.num_locals as usize {
                return Err(Fault::LocalOutOfRange(var));
            }
            Ok(f.locals[index])
        }
        _ => m.read_global(var),
    }
}

fn write_var(m: &mut Machine, f: &mut Frame, var: u8, value: u16) -> Result<(), Fault> {
    match var {
        0x00 => m.stack.push(value),
        0x01..=0x0F => {
            let index = (var - 1) as usize;
            if index >= f.num_locals as usize {
                return Err(Fault::LocalOutOfRange(var));
            }
            f.locals[index] = value;
            Ok(())
        }
        _ => m.write_global(var, value),
    }
}

fn read_src(m: &mut Machine, f: &mut Frame, s: Src) -> Result<u16, Fault> {
    match s {
        Src::Imm(v) => Ok(v),
        Src::Accum => Ok(f.accum),
        Src::Var(var) => read_var(m, f, var),
    }
}

fn write_dest(m: &mut Machine, f: &mut Frame, d: Dest, value: u16) -> Result<(), Fault> {
    match d {
        Dest::Accum => {
            f.accum = value;
            Ok(())
        }
        Dest::Var(var) => write_var(m, f, var, value),
    }
}

fn eval_binary(op: BinOp, a: u16, b: u16) -> Result<u16, Fault> {
    Ok(match op {
        BinOp::Add => signed(a).wrapping_add(signed(b)) as u16,
        BinOp::Sub => signed(a).wrapping_sub(signed(b)) as u16,
        BinOp::Mul => signed(a).wrapping_mul(signed(b)) as u16,
        BinOp::Div => {
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }
            signed(a).wrapping_div(signed(b)) as u16
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }
            signed(a).wrapping_rem(signed(b)) as u16
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::LogShift => {
            let places = signed(b);
            if places >= 0 {
                a.checked_shl(places as u32).unwrap_or(0)
            } else {
                a.checked_shr(-places as u32).unwrap_or(0)
            }
        }
        BinOp::ArtShift => {
            let places = signed(b);
            if places >= 0 {
                (signed(a).checked_shl(places as u32).unwrap_or(0)) as u16
            } else {
                signed(a).checked_shr(-places as u32).unwrap_or(if signed(a) < 0 {
                    -1
                } else {
                    0
                }) as u16
            }
        }
    })
}

impl CompiledRoutine {
    /// The call gateway lands here: locals filled from defaults and
    /// arguments, then the block loop runs until an exit returns.
    pub fn run(&self, m: &mut Machine, args: &[u16]) -> Result<u16, Trap> {
        let mut frame = Frame::new(self, args, m.call_depth, m.stack.depth());
        m.hooks.routine_entered(self.addr);
        let result = self.run_blocks(m, &mut frame);
        m.hooks.routine_exited(self.addr);
        if result.is_ok() {
            // Whatever the routine left on the stack is discarded; the
            // caller's picture of the stack is restored.
            m.stack.truncate(frame.stack_base);
        }
        result
    }

    fn run_blocks(&self, m: &mut Machine, f: &mut Frame) -> Result<u16, Trap> {
        let mut block = self.entry;
        loop {
            let b = &self.blocks[block];
            for cop in &b.ops {
                m.last_addr = cop.addr;
                m.tick()?;
                m.hooks.instruction_executed(cop.addr);
                if let Some(returned) = exec_op(m, f, &cop.op)? {
                    return Ok(returned);
                }
            }
            m.last_addr = b.exit_addr;
            m.tick()?;
            match &b.exit {
                BlockExit::Jump(target) => block = *target,
                BlockExit::Branch {
                    cond,
                    on_true,
                    taken,
                    fall,
                } => {
                    if eval_cond(m, f, cond)? == *on_true {
                        match taken {
                            ExitTarget::Block(t) => block = *t,
                            ExitTarget::ReturnTrue => return Ok(1),
                            ExitTarget::ReturnFalse => return Ok(0),
                        }
                    } else {
                        block = *fall;
                    }
                }
                BlockExit::Return(src) => return Ok(read_src(m, f, *src)?),
                BlockExit::Quit => return Err(Trap::Quit),
                BlockExit::Restart => return Err(Trap::Restart),
                BlockExit::Throw { value, frame } => {
                    let value = read_src(m, f, *value)?;
                    let depth = read_src(m, f, *frame)? as usize;
                    if depth == f.depth {
                        // catch and throw in the same frame: plain return
                        return Ok(value);
                    }
                    return Err(Trap::Unwind { depth, value });
                }
                BlockExit::ComputedJump => {
                    return Err(Fault::Decode {
                        addr: b.exit_addr,
                        reason: "jump through a computed target".to_string(),
                    }
                    .into())
                }
                BlockExit::NoExit => {
                    return Err(Fault::Decode {
                        addr: b.exit_addr,
                        reason: "control ran off a block with no exit".to_string(),
                    }
                    .into())
                }
            }
        }
    }
}

/// Execute one op. `Ok(Some(v))` means the current routine returns `v`
/// (a throw unwound to this frame).
fn exec_op(m: &mut Machine, f: &mut Frame, op: &Op) -> Result<Option<u16>, Trap> {
    match op {
        Op::Binary { op, a, b, dest } => {
            let a = read_src(m, f, *a)?;
            let b = read_src(m, f, *b)?;
            let v = eval_binary(*op, a, b)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::Not { a, dest } => {
            let v = !read_src(m, f, *a)?;
            write_dest(m, f, *dest, v)?;
        }

        Op::LoadVar { var, dest } => {
            let var = read_src(m, f, *var)? as u8;
            let v = read_var(m, f, var)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::StoreVar { var, value } => {
            let var = read_src(m, f, *var)? as u8;
            let v = read_src(m, f, *value)?;
            write_var(m, f, var, v)?;
        }
        Op::IncVar { var, delta } => {
            let var = read_src(m, f, *var)? as u8;
            let v = read_var(m, f, var)?;
            write_var(m, f, var, signed(v).wrapping_add(*delta) as u16)?;
        }

        Op::LoadW { arr, idx, dest } => {
            let arr = read_src(m, f, *arr)?;
            let idx = read_src(m, f, *idx)?;
            let addr = arr as u32 + 2 * idx as u32;
            let v = m.memory.read_word(addr)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::LoadB { arr, idx, dest } => {
            let arr = read_src(m, f, *arr)?;
            let idx = read_src(m, f, *idx)?;
            let v = m.memory.read_byte(arr as u32 + idx as u32)? as u16;
            write_dest(m, f, *dest, v)?;
        }
        Op::StoreW { arr, idx, value } => {
            let arr = read_src(m, f, *arr)?;
            let idx = read_src(m, f, *idx)?;
            let v = read_src(m, f, *value)?;
            m.memory.write_word(arr as u32 + 2 * idx as u32, v)?;
        }
        Op::StoreB { arr, idx, value } => {
            let arr = read_src(m, f, *arr)?;
            let idx = read_src(m, f, *idx)?;
            let v = read_src(m, f, *value)?;
            m.memory.write_byte(arr as u32 + idx as u32, v as u8)?;
        }
        Op::CopyTable { first, second, size } => {
            let first = read_src(m, f, *first)?;
            let second = read_src(m, f, *second)?;
            let size = read_src(m, f, *size)?;
            copy_table(m, first, second, size)?;
        }
        Op::PrintTable { addr, width, height } => {
            let addr = read_src(m, f, *addr)?;
            let width = read_src(m, f, *width)?;
            let height = read_src(m, f, *height)?;
            print_table(m, addr, width, height)?;
        }

        Op::GetProp { obj, prop, dest } => {
            let obj = read_src(m, f, *obj)?;
            let prop = read_src(m, f, *prop)?;
            let v = m.objects.get_prop(&m.memory, obj, prop)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::GetPropAddr { obj, prop, dest } => {
            let obj = read_src(m, f, *obj)?;
            let prop = read_src(m, f, *prop)?;
            let v = m.objects.get_prop_addr(&m.memory, obj, prop)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::GetNextProp { obj, prop, dest } => {
            let obj = read_src(m, f, *obj)?;
            let prop = read_src(m, f, *prop)?;
            let v = m.objects.get_next_prop(&m.memory, obj, prop)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::GetPropLen { addr, dest } => {
            let addr = read_src(m, f, *addr)?;
            let v = m.objects.get_prop_len(&m.memory, addr)?;
            write_dest(m, f, *dest, v)?;
        }
        Op::PutProp { obj, prop, value } => {
            let obj = read_src(m, f, *obj)?;
            let prop = read_src(m, f, *prop)?;
            let v = read_src(m, f, *value)?;
            m.objects.put_prop(&mut m.memory, obj, prop, v)?;
        }
        Op::GetParent { obj, dest } => {
            let obj = read_src(m, f, *obj)?;
            // Object 0 navigates to the documented 0, without faulting.
            let v = if obj == 0 {
                0
            } else {
                m.objects.parent(&m.memory, obj)?
            };
            write_dest(m, f, *dest, v)?;
        }
        Op::InsertObj { obj, into } => {
            let obj = read_src(m, f, *obj)?;
            let into = read_src(m, f, *into)?;
            m.objects.insert_obj(&mut m.memory, obj, into)?;
        }
        Op::RemoveObj { obj } => {
            let obj = read_src(m, f, *obj)?;
            m.objects.remove_obj(&mut m.memory, obj)?;
        }
        Op::SetAttr { obj, attr } => {
            let obj = read_src(m, f, *obj)?;
            let attr = read_src(m, f, *attr)?;
            m.objects.set_attr(&mut m.memory, obj, attr)?;
        }
        Op::ClearAttr { obj, attr } => {
            let obj = read_src(m, f, *obj)?;
            let attr = read_src(m, f, *attr)?;
            m.objects.clear_attr(&mut m.memory, obj, attr)?;
        }
        Op::PrintObj { obj } => {
            let obj = read_src(m, f, *obj)?;
            let name = m.objects.short_name(&m.memory, obj)?;
            m.print_str(&name)?;
        }

        Op::Call { routine, args, dest } => {
            let packed = read_src(m, f, *routine)?;
            let mut argv = Vec::with_capacity(args.len());
            for a in args {
                argv.push(read_src(m, f, *a)?);
            }
            match crate::jit::call_routine(m, packed, &argv) {
                Ok(value) => {
                    if let Some(d) = dest {
                        write_dest(m, f, *d, value)?;
                    }
                }
                Err(Trap::Unwind { depth, value }) if depth == f.depth => {
                    // throw targeted this frame: the routine returns now.
                    return Ok(Some(value));
                }
                Err(e) => return Err(e),
            }
        }
        Op::Push { value } => {
            let v = read_src(m, f, *value)?;
            m.stack.push(v)?;
        }
        Op::Pull { var } => {
            let var = read_src(m, f, *var)? as u8;
            let v = m.stack.pop()?;
            write_var(m, f, var, v)?;
        }
        Op::PopDiscard => {
            m.stack.pop()?;
        }
        Op::Catch { dest } => {
            write_dest(m, f, *dest, f.depth as u16)?;
        }

        Op::PrintLit { text } => m.print_str(text)?,
        Op::NewLine => m.new_line()?,
        Op::PrintAddr { addr } => {
            let addr = read_src(m, f, *addr)?;
            let (s, _) = crate::text::decode(&m.memory, addr as u32, m.header.abbrev_table)?;
            m.print_str(&s)?;
        }
        Op::PrintPaddr { addr } => {
            let packed = read_src(m, f, *addr)?;
            let addr = m.header.unpack_string(packed);
            let (s, _) = crate::text::decode(&m.memory, addr, m.header.abbrev_table)?;
            m.print_str(&s)?;
        }
        Op::PrintChar { ch } => {
            let ch = read_src(m, f, *ch)?;
            m.print_char_code(ch)?;
        }
        Op::PrintNum { value } => {
            let v = read_src(m, f, *value)?;
            m.print_str(&signed(v).to_string())?;
        }
        Op::SplitWindow { lines } => {
            let lines = read_src(m, f, *lines)?;
            m.screen
                .split_window(lines)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Op::SetWindow { window } => {
            let w = read_src(m, f, *window)?;
            m.screen
                .set_window(w)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Op::EraseWindow { window } => {
            let w = read_src(m, f, *window)?;
            m.screen
                .erase_window(w as i16)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Op::EraseLine { value } => {
            let v = read_src(m, f, *value)?;
            if v == 1 {
                m.screen.erase_line().map_err(|e| Fault::Screen(e.message))?;
            }
        }
        Op::SetCursor { line, col } => {
            let line = read_src(m, f, *line)?;
            let col = read_src(m, f, *col)?;
            m.screen
                .set_cursor(line, col)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Op::GetCursor { arr } => {
            let arr = read_src(m, f, *arr)?;
            // Cursor queries only make sense on the upper window; report
            // home otherwise.
            m.memory.write_word(arr as u32, 1)?;
            m.memory.write_word(arr as u32 + 2, 1)?;
        }
        Op::SetTextStyle { style } => {
            let s = read_src(m, f, *style)?;
            m.screen
                .set_text_style(s)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Op::BufferMode { flag } => {
            let b = read_src(m, f, *flag)?;
            m.screen
                .buffer_mode(b != 0)
                .map_err(|e| Fault::Screen(e.message))?;
        }
        Op::OutputStream { stream, table } => {
            let stream = read_src(m, f, *stream)? as i16;
            let table = match table {
                Some(t) => Some(read_src(m, f, *t)?),
                None => None,
            };
            m.select_output_stream(stream, table)?;
        }
        Op::InputStream { stream } => {
            let s = read_src(m, f, *stream)?;
            log::debug!("input_stream {s} ignored");
        }
        Op::SoundEffect { args } => {
            for a in args {
                read_src(m, f, *a)?;
            }
            log::debug!("sound_effect ignored");
        }
        Op::ShowStatus => m.show_status()?,
        Op::SetColour { fg, bg } => {
            let fg = read_src(m, f, *fg)?;
            let bg = read_src(m, f, *bg)?;
            log::debug!("set_colour {fg} {bg} ignored");
        }

        Op::Read {
            text,
            parse,
            extra,
            dest,
        } => {
            let text = read_src(m, f, *text)?;
            let parse = read_src(m, f, *parse)?;
            for e in extra {
                read_src(m, f, *e)?;
            }
            let terminator = m.read_line_into(text, parse)?;
            if let Some(d) = dest {
                write_dest(m, f, *d, terminator)?;
            }
        }
        Op::ReadChar { args, dest } => {
            for a in args {
                read_src(m, f, *a)?;
            }
            let code = m.read_char_code()?;
            write_dest(m, f, *dest, code)?;
        }
        Op::Random { range, dest } => {
            let range = read_src(m, f, *range)?;
            let v = m.do_random(signed(range));
            write_dest(m, f, *dest, v)?;
        }
        Op::Tokenise { text, parse } => {
            let text = read_src(m, f, *text)?;
            let parse = read_src(m, f, *parse)?;
            tokenise_buffer(m, text, parse)?;
        }
        Op::EncodeText { text, len, from, coded } => {
            let text = read_src(m, f, *text)?;
            let len = read_src(m, f, *len)?;
            let from = read_src(m, f, *from)?;
            let coded = read_src(m, f, *coded)?;
            encode_text(m, text, len, from, coded)?;
        }
        Op::StoreConst { value, dest } => {
            write_dest(m, f, *dest, *value)?;
        }
        Op::SetFont { font, dest } => {
            let font = read_src(m, f, *font)?;
            // Only the normal font exists; report "previous font 1" for
            // it and failure for the rest.
            write_dest(m, f, *dest, if font <= 1 { 1 } else { 0 })?;
        }
        Op::Nop => {}

        Op::Unknown { kind, number } => {
            return Err(Fault::UnknownOpcode {
                kind: *kind,
                number: *number,
                version: m.version(),
            }
            .into())
        }
    }
    Ok(None)
}

fn eval_cond(m: &mut Machine, f: &mut Frame, cond: &Cond) -> Result<bool, Trap> {
    Ok(match cond {
        Cond::Jz { a } => read_src(m, f, *a)? == 0,
        Cond::Je { a, others } => {
            let a = read_src(m, f, *a)?;
            let mut hit = false;
            for o in others {
                // All operands are read (and popped) regardless of an
                // early match; the interpreter does the same.
                let v = read_src(m, f, *o)?;
                hit |= v == a;
            }
            hit
        }
        Cond::Jl { a, b } => signed(read_src(m, f, *a)?) < signed(read_src(m, f, *b)?),
        Cond::Jg { a, b } => signed(read_src(m, f, *a)?) > signed(read_src(m, f, *b)?),
        Cond::DecChk { var, limit } => {
            let var = read_src(m, f, *var)? as u8;
            let limit = read_src(m, f, *limit)?;
            let v = signed(read_var(m, f, var)?).wrapping_sub(1);
            write_var(m, f, var, v as u16)?;
            v < signed(limit)
        }
        Cond::IncChk { var, limit } => {
            let var = read_src(m, f, *var)? as u8;
            let limit = read_src(m, f, *limit)?;
            let v = signed(read_var(m, f, var)?).wrapping_add(1);
            write_var(m, f, var, v as u16)?;
            v > signed(limit)
        }
        Cond::Jin { child, parent } => {
            let child = read_src(m, f, *child)?;
            let parent = read_src(m, f, *parent)?;
            let actual = if child == 0 {
                0
            } else {
                m.objects.parent(&m.memory, child)?
            };
            actual == parent
        }
        Cond::Test { bitmap, flags } => {
            let bitmap = read_src(m, f, *bitmap)?;
            let flags = read_src(m, f, *flags)?;
            bitmap & flags == flags
        }
        Cond::TestAttr { obj, attr } => {
            let obj = read_src(m, f, *obj)?;
            let attr = read_src(m, f, *attr)?;
            m.objects.test_attr(&m.memory, obj, attr)?
        }
        Cond::GetChild { obj, dest } => {
            let obj = read_src(m, f, *obj)?;
            let v = if obj == 0 {
                0
            } else {
                m.objects.child(&m.memory, obj)?
            };
            write_dest(m, f, *dest, v)?;
            v != 0
        }
        Cond::GetSibling { obj, dest } => {
            let obj = read_src(m, f, *obj)?;
            let v = if obj == 0 {
                0
            } else {
                m.objects.sibling(&m.memory, obj)?
            };
            write_dest(m, f, *dest, v)?;
            v != 0
        }
        Cond::ScanTable {
            x,
            table,
            len,
            form,
            dest,
        } => {
            let x = read_src(m, f, *x)?;
            let table = read_src(m, f, *table)?;
            let len = read_src(m, f, *len)?;
            let form = match form {
                Some(s) => read_src(m, f, *s)?,
                None => 0x82,
            };
            let found = scan_table(m, x, table, len, form)?;
            write_dest(m, f, *dest, found)?;
            found != 0
        }
        Cond::ArgCountGe { n } => {
            let n = read_src(m, f, *n)?;
            f.arg_count as u16 >= n
        }
        Cond::Verify => m.verify(),
        Cond::Always => true,
        Cond::Never => false,
    })
}

// ---- shared service helpers (used by the interpreter as well) ----

pub fn copy_table(m: &mut Machine, first: u16, second: u16, size: u16) -> Result<(), Fault> {
    let len = signed(size).unsigned_abs() as u32;
    if second == 0 {
        // Zero the source table.
        for i in 0..len {
            m.memory.write_byte(first as u32 + i, 0)?;
        }
        return Ok(());
    }
    if signed(size) < 0 || second < first {
        // Forced forward copy, or non-overlapping ascending copy.
        for i in 0..len {
            let b = m.memory.read_byte(first as u32 + i)?;
            m.memory.write_byte(second as u32 + i, b)?;
        }
    } else {
        // Copy backwards so an overlapping destination is safe.
        for i in (0..len).rev() {
            let b = m.memory.read_byte(first as u32 + i)?;
            m.memory.write_byte(second as u32 + i, b)?;
        }
    }
    Ok(())
}

pub fn print_table(m: &mut Machine, addr: u16, width: u16, height: u16) -> Result<(), Fault> {
    let height = if height == 0 { 1 } else { height };
    for row in 0..height {
        if row > 0 {
            m.new_line()?;
        }
        for col in 0..width {
            let offset = row as u32 * width as u32 + col as u32;
            let b = m.memory.read_byte(addr as u32 + offset)?;
            m.print_char_code(b as u16)?;
        }
    }
    Ok(())
}

pub fn scan_table(m: &Machine, x: u16, table: u16, len: u16, form: u16) -> Result<u16, Fault> {
    let field = (form & 0x7F) as u32;
    if field == 0 {
        return Ok(0);
    }
    let words = form & 0x80 != 0;
    for i in 0..len {
        let addr = table as u32 + i as u32 * field;
        let v = if words {
            m.memory.read_word(addr)?
        } else {
            m.memory.read_byte(addr)? as u16
        };
        if v == x {
            return Ok(addr as u16);
        }
    }
    Ok(0)
}

pub fn tokenise_buffer(m: &mut Machine, text_buf: u16, parse_buf: u16) -> Result<(), Fault> {
    // Reconstruct the line from the text buffer, then tokenize it the
    // same way sread does.
    let version = m.version();
    let (first, len) = if version <= 4 {
        let mut len = 0u32;
        while m.memory.read_byte(text_buf as u32 + 1 + len)? != 0 {
            len += 1;
        }
        (1u32, len)
    } else {
        (2u32, m.memory.read_byte(text_buf as u32 + 1)? as u32)
    };
    let mut line = String::with_capacity(len as usize);
    for i in 0..len {
        line.push(m.memory.read_byte(text_buf as u32 + first + i)? as char);
    }
    let dict = m.dictionary;
    dict.tokenize(&mut m.memory, text_buf, parse_buf, &line, first)
}

pub fn encode_text(m: &mut Machine, text: u16, len: u16, from: u16, coded: u16) -> Result<(), Fault> {
    let mut word = String::with_capacity(len as usize);
    for i in 0..len {
        word.push(m.memory.read_byte(text as u32 + from as u32 + i as u32)? as char);
    }
    let encoded = crate::text::encode_word(&word, m.version());
    for (i, b) in encoded.iter().enumerate() {
        m.memory.write_byte(coded as u32 + i as u32, *b)?;
    }
    Ok(())
}
