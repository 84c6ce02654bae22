//! The direct decode-and-dispatch engine: the validation baseline for
//! the compiled path, and a complete interpreter in its own right. Every
//! opcode's observable effects — memory, stack, variables, output —
//! must match the compiled code exactly, opcode for opcode.

use crate::fault::{Fault, Trap};
use crate::instruction::{BranchTarget, Instruction, OpcodeKind, OperandKind};
use crate::jit::ops::{copy_table, encode_text, print_table, scan_table, tokenise_buffer};
use crate::machine::Machine;
use crate::text;
use log::debug;
use std::rc::Rc;

/// One routine invocation on the explicit call stack.
struct Frame {
    return_pc: u32,
    store: Option<u8>,
    locals: [u16; 15],
    num_locals: u8,
    arg_count: u8,
    stack_base: usize,
}

impl Frame {
    fn main() -> Frame {
        Frame {
            return_pc: 0,
            store: None,
            locals: [0; 15],
            num_locals: 0,
            arg_count: 0,
            stack_base: 0,
        }
    }
}

pub struct Interp<'a> {
    m: &'a mut Machine,
    pc: u32,
    frames: Vec<Frame>,
    done: bool,
}

/// Run a machine to termination through the step engine.
pub fn run(m: &mut Machine) -> Result<(), Trap> {
    let main = m.main_routine()?;
    let start = main.code_start;
    let mut engine = Interp {
        m,
        pc: start,
        frames: vec![Frame::main()],
        done: false,
    };
    while !engine.done {
        engine.step()?;
    }
    Ok(())
}

impl<'a> Interp<'a> {
    fn step(&mut self) -> Result<(), Trap> {
        let pc = self.pc;
        self.m.last_addr = pc;
        self.m.tick()?;
        let version = self.m.version();
        let inst = self
            .m
            .instructions
            .decode(&self.m.memory, pc, version)?;
        self.m.hooks.instruction_executed(pc);
        self.pc = inst.next_addr();
        self.execute(&inst)
    }

    /// Evaluate operands left to right; a stack-variable operand pops.
    fn resolve_operands(&mut self, inst: &Instruction) -> Result<Vec<u16>, Fault> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for op in &inst.operands {
            values.push(match op.kind {
                OperandKind::Variable => self.read_variable(op.value as u8)?,
                _ => op.value,
            });
        }
        Ok(values)
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("interpreter always has a frame")
    }

    fn read_variable(&mut self, var: u8) -> Result<u16, Fault> {
        match var {
            0x00 => self.m.stack.pop(),
            0x01..=0x0F => {
                let frame = self.frames.last().ok_or(Fault::NoActiveFrame)?;
                let index = (var - 1) as usize;
                if index >= frame.num_locals as usize {
                    return Err(Fault::LocalOutOfRange(var));
                }
                Ok(frame.locals[index])
            }
            _ => self.m.read_global(var),
        }
    }

    fn write_variable(&mut self, var: u8, value: u16) -> Result<(), Fault> {
        match var {
            0x00 => self.m.stack.push(value),
            0x01..=0x0F => {
                let frame = self.frames.last_mut().ok_or(Fault::NoActiveFrame)?;
                let index = (var - 1) as usize;
                if index >= frame.num_locals as usize {
                    return Err(Fault::LocalOutOfRange(var));
                }
                frame.locals[index] = value;
                Ok(())
            }
            _ => self.m.write_global(var, value),
        }
    }

    fn store_result(&mut self, inst: &Instruction, value: u16) -> Result<(), Fault> {
        match inst.store {
            Some(var) => self.write_variable(var, value),
            None => Ok(()),
        }
    }

    /// Apply a decoded branch: transfer, return, or fall through.
    fn branch(&mut self, inst: &Instruction, condition: bool) -> Result<(), Trap> {
        let b = inst.branch.as_ref().ok_or_else(|| Fault::Decode {
            addr: inst.addr,
            reason: "branch on a non-branch instruction".to_string(),
        })?;
        if condition != b.on_true {
            return Ok(());
        }
        match b.target {
            BranchTarget::ReturnTrue => self.return_from(1),
            BranchTarget::ReturnFalse => self.return_from(0),
            BranchTarget::Offset(_) => {
                self.pc = inst.branch_target_addr().unwrap();
                Ok(())
            }
        }
    }

    fn call(&mut self, packed: u16, args: &[u16], store: Option<u8>) -> Result<(), Trap> {
        if packed == 0 {
            if let Some(var) = store {
                self.write_variable(var, 0)?;
            }
            return Ok(());
        }
        let limit = self.m.config.call_depth_limit;
        if self.frames.len() - 1 >= limit {
            return Err(Fault::CallDepthExceeded(limit).into());
        }
        let addr = self.m.header.unpack_routine(packed);
        let routine = self.m.routine(addr)?;
        let args = &args[..args.len().min(7)];

        let mut locals = [0u16; 15];
        for (i, d) in routine.local_defaults.iter().enumerate() {
            locals[i] = *d;
        }
        let n = args.len().min(routine.num_locals as usize);
        locals[..n].copy_from_slice(&args[..n]);

        self.frames.push(Frame {
            return_pc: self.pc,
            store,
            locals,
            num_locals: routine.num_locals,
            arg_count: args.len() as u8,
            stack_base: self.m.stack.depth(),
        });
        self.m.hooks.routine_entered(addr);
        self.pc = routine.code_start;
        Ok(())
    }

    fn return_from(&mut self, value: u16) -> Result<(), Trap> {
        let frame = self.frames.pop().expect("return without a frame");
        self.m.stack.truncate(frame.stack_base);
        if self.frames.is_empty() {
            // The entry routine ran off its end.
            self.done = true;
            return Ok(());
        }
        self.m.hooks.routine_exited(self.pc);
        self.pc = frame.return_pc;
        if let Some(var) = frame.store {
            self.write_variable(var, value)?;
        }
        Ok(())
    }

    fn execute(&mut self, inst: &Rc<Instruction>) -> Result<(), Trap> {
        let v = self.m.version();
        let ops = self.resolve_operands(inst)?;
        let need = crate::opcode_tables::min_operands(inst.kind, inst.number, v);
        if ops.len() < need {
            return Err(Fault::Decode {
                addr: inst.addr,
                reason: format!("{} needs at least {} operand(s)", inst.name(v), need),
            }
            .into());
        }
        let s = |x: u16| x as i16;

        match (inst.kind, inst.number) {
            // ---- 2OP ----
            (OpcodeKind::Op2, 0x01) => {
                let hit = ops[1..].iter().any(|o| *o == ops[0]);
                self.branch(inst, hit)
            }
            (OpcodeKind::Op2, 0x02) => self.branch(inst, s(ops[0]) < s(ops[1])),
            (OpcodeKind::Op2, 0x03) => self.branch(inst, s(ops[0]) > s(ops[1])),
            (OpcodeKind::Op2, 0x04) => {
                let var = ops[0] as u8;
                let value = s(self.read_variable(var)?).wrapping_sub(1);
                self.write_variable(var, value as u16)?;
                self.branch(inst, value < s(ops[1]))
            }
            (OpcodeKind::Op2, 0x05) => {
                let var = ops[0] as u8;
                let value = s(self.read_variable(var)?).wrapping_add(1);
                self.write_variable(var, value as u16)?;
                self.branch(inst, value > s(ops[1]))
            }
            (OpcodeKind::Op2, 0x06) => {
                let parent = if ops[0] == 0 {
                    0
                } else {
                    self.m.objects.parent(&self.m.memory, ops[0])?
                };
                self.branch(inst, parent == ops[1])
            }
            (OpcodeKind::Op2, 0x07) => self.branch(inst, ops[0] & ops[1] == ops[1]),
            (OpcodeKind::Op2, 0x08) => {
                let r = ops[0] | ops[1];
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x09) => {
                let r = ops[0] & ops[1];
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x0A) => {
                let set = self.m.objects.test_attr(&self.m.memory, ops[0], ops[1])?;
                self.branch(inst, set)
            }
            (OpcodeKind::Op2, 0x0B) => {
                self.m
                    .objects
                    .set_attr(&mut self.m.memory, ops[0], ops[1])?;
                Ok(())
            }
            (OpcodeKind::Op2, 0x0C) => {
                self.m
                    .objects
                    .clear_attr(&mut self.m.memory, ops[0], ops[1])?;
                Ok(())
            }
            (OpcodeKind::Op2, 0x0D) => {
                self.write_variable(ops[0] as u8, ops[1])?;
                Ok(())
            }
            (OpcodeKind::Op2, 0x0E) => {
                self.m
                    .objects
                    .insert_obj(&mut self.m.memory, ops[0], ops[1])?;
                Ok(())
            }
            (OpcodeKind::Op2, 0x0F) => {
                let value = self.m.memory.read_word(ops[0] as u32 + 2 * ops[1] as u32)?;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x10) => {
                let value = self.m.memory.read_byte(ops[0] as u32 + ops[1] as u32)? as u16;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x11) => {
                let value = self.m.objects.get_prop(&self.m.memory, ops[0], ops[1])?;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x12) => {
                let value = self
                    .m
                    .objects
                    .get_prop_addr(&self.m.memory, ops[0], ops[1])?;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x13) => {
                let value = self
                    .m
                    .objects
                    .get_next_prop(&self.m.memory, ops[0], ops[1])?;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x14) => {
                let r = s(ops[0]).wrapping_add(s(ops[1])) as u16;
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x15) => {
                let r = s(ops[0]).wrapping_sub(s(ops[1])) as u16;
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x16) => {
                let r = s(ops[0]).wrapping_mul(s(ops[1])) as u16;
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x17) => {
                if ops[1] == 0 {
                    return Err(Fault::DivisionByZero.into());
                }
                let r = s(ops[0]).wrapping_div(s(ops[1])) as u16;
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x18) => {
                if ops[1] == 0 {
                    return Err(Fault::DivisionByZero.into());
                }
                let r = s(ops[0]).wrapping_rem(s(ops[1])) as u16;
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op2, 0x19) if v >= 4 => self.call(ops[0], &ops[1..], inst.store),
            (OpcodeKind::Op2, 0x1A) if v >= 5 => self.call(ops[0], &ops[1..], None),
            (OpcodeKind::Op2, 0x1B) if v >= 5 => {
                debug!("set_colour {} {} ignored", ops[0], ops[1]);
                Ok(())
            }
            (OpcodeKind::Op2, 0x1C) if v >= 5 => self.do_throw(ops[0], ops[1]),

            // ---- 1OP ----
            (OpcodeKind::Op1, 0x00) => self.branch(inst, ops[0] == 0),
            (OpcodeKind::Op1, 0x01) => {
                let value = if ops[0] == 0 {
                    0
                } else {
                    self.m.objects.sibling(&self.m.memory, ops[0])?
                };
                self.store_result(inst, value)?;
                self.branch(inst, value != 0)
            }
            (OpcodeKind::Op1, 0x02) => {
                let value = if ops[0] == 0 {
                    0
                } else {
                    self.m.objects.child(&self.m.memory, ops[0])?
                };
                self.store_result(inst, value)?;
                self.branch(inst, value != 0)
            }
            (OpcodeKind::Op1, 0x03) => {
                let value = if ops[0] == 0 {
                    0
                } else {
                    self.m.objects.parent(&self.m.memory, ops[0])?
                };
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op1, 0x04) => {
                let value = self.m.objects.get_prop_len(&self.m.memory, ops[0])?;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op1, 0x05) => {
                let var = ops[0] as u8;
                let value = s(self.read_variable(var)?).wrapping_add(1);
                self.write_variable(var, value as u16)?;
                Ok(())
            }
            (OpcodeKind::Op1, 0x06) => {
                let var = ops[0] as u8;
                let value = s(self.read_variable(var)?).wrapping_sub(1);
                self.write_variable(var, value as u16)?;
                Ok(())
            }
            (OpcodeKind::Op1, 0x07) => {
                let (text, _) =
                    text::decode(&self.m.memory, ops[0] as u32, self.m.header.abbrev_table)?;
                self.m.print_str(&text)?;
                Ok(())
            }
            (OpcodeKind::Op1, 0x08) if v >= 4 => self.call(ops[0], &[], inst.store),
            (OpcodeKind::Op1, 0x09) => {
                self.m.objects.remove_obj(&mut self.m.memory, ops[0])?;
                Ok(())
            }
            (OpcodeKind::Op1, 0x0A) => {
                let name = self.m.objects.short_name(&self.m.memory, ops[0])?;
                self.m.print_str(&name)?;
                Ok(())
            }
            (OpcodeKind::Op1, 0x0B) => self.return_from(ops[0]),
            (OpcodeKind::Op1, 0x0C) => match inst.jump_target_addr() {
                Some(target) => {
                    self.pc = target;
                    Ok(())
                }
                None => Err(Fault::Decode {
                    addr: inst.addr,
                    reason: "jump through a computed target".to_string(),
                }
                .into()),
            },
            (OpcodeKind::Op1, 0x0D) => {
                let addr = self.m.header.unpack_string(ops[0]);
                let (text, _) = text::decode(&self.m.memory, addr, self.m.header.abbrev_table)?;
                self.m.print_str(&text)?;
                Ok(())
            }
            (OpcodeKind::Op1, 0x0E) => {
                let value = self.read_variable(ops[0] as u8)?;
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Op1, 0x0F) if v <= 4 => {
                let r = !ops[0];
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Op1, 0x0F) => self.call(ops[0], &[], None),

            // ---- 0OP ----
            (OpcodeKind::Op0, 0x00) => self.return_from(1),
            (OpcodeKind::Op0, 0x01) => self.return_from(0),
            (OpcodeKind::Op0, 0x02) => {
                let text = self.payload_text(inst)?;
                self.m.print_str(&text)?;
                Ok(())
            }
            (OpcodeKind::Op0, 0x03) => {
                let text = self.payload_text(inst)?;
                self.m.print_str(&text)?;
                self.m.new_line()?;
                self.return_from(1)
            }
            (OpcodeKind::Op0, 0x04) => Ok(()),
            (OpcodeKind::Op0, 0x05 | 0x06) if v <= 3 => self.branch(inst, false),
            (OpcodeKind::Op0, 0x05 | 0x06) if v == 4 => {
                self.store_result(inst, 0).map_err(Trap::from)
            }
            (OpcodeKind::Op0, 0x07) => Err(Trap::Restart),
            (OpcodeKind::Op0, 0x08) => {
                let value = self.m.stack.pop()?;
                self.return_from(value)
            }
            (OpcodeKind::Op0, 0x09) if v <= 4 => {
                self.m.stack.pop()?;
                Ok(())
            }
            (OpcodeKind::Op0, 0x09) => {
                let token = (self.frames.len() - 1) as u16;
                self.store_result(inst, token).map_err(Trap::from)
            }
            (OpcodeKind::Op0, 0x0A) => Err(Trap::Quit),
            (OpcodeKind::Op0, 0x0B) => {
                self.m.new_line()?;
                Ok(())
            }
            (OpcodeKind::Op0, 0x0C) if v == 3 => {
                self.m.show_status()?;
                Ok(())
            }
            (OpcodeKind::Op0, 0x0D) => {
                let ok = self.m.verify();
                self.branch(inst, ok)
            }
            (OpcodeKind::Op0, 0x0F) if v >= 5 => self.branch(inst, true),

            // ---- VAR ----
            (OpcodeKind::Var, 0x00) => self.call(ops[0], &ops[1..], inst.store),
            (OpcodeKind::Var, 0x01) => {
                self.m
                    .memory
                    .write_word(ops[0] as u32 + 2 * ops[1] as u32, ops[2])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x02) => {
                self.m
                    .memory
                    .write_byte(ops[0] as u32 + ops[1] as u32, ops[2] as u8)?;
                Ok(())
            }
            (OpcodeKind::Var, 0x03) => {
                self.m
                    .objects
                    .put_prop(&mut self.m.memory, ops[0], ops[1], ops[2])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x04) => {
                let parse = ops.get(1).copied().unwrap_or(0);
                let terminator = self.m.read_line_into(ops[0], parse)?;
                if v >= 5 {
                    self.store_result(inst, terminator)?;
                }
                Ok(())
            }
            (OpcodeKind::Var, 0x05) => {
                self.m.print_char_code(ops[0])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x06) => {
                self.m.print_str(&s(ops[0]).to_string())?;
                Ok(())
            }
            (OpcodeKind::Var, 0x07) => {
                let value = self.m.do_random(s(ops[0]));
                self.store_result(inst, value).map_err(Trap::from)
            }
            (OpcodeKind::Var, 0x08) => {
                self.m.stack.push(ops[0])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x09) => {
                let value = self.m.stack.pop()?;
                self.write_variable(ops[0] as u8, value)?;
                Ok(())
            }
            (OpcodeKind::Var, 0x0A) if v >= 3 => {
                self.m
                    .screen
                    .split_window(ops[0])
                    .map_err(|e| Fault::Screen(e.message))?;
                Ok(())
            }
            (OpcodeKind::Var, 0x0B) if v >= 3 => {
                self.m
                    .screen
                    .set_window(ops[0])
                    .map_err(|e| Fault::Screen(e.message))?;
                Ok(())
            }
            (OpcodeKind::Var, 0x0C) if v >= 4 => self.call(ops[0], &ops[1..], inst.store),
            (OpcodeKind::Var, 0x0D) if v >= 4 => {
                self.m
                    .screen
                    .erase_window(ops[0] as i16)
                    .map_err(|e| Fault::Screen(e.message))?;
                Ok(())
            }
            (OpcodeKind::Var, 0x0E) if v >= 4 => {
                if ops[0] == 1 {
                    self.m
                        .screen
                        .erase_line()
                        .map_err(|e| Fault::Screen(e.message))?;
                }
                Ok(())
            }
            (OpcodeKind::Var, 0x0F) if v >= 4 => {
                self.m
                    .screen
                    .set_cursor(ops[0], ops[1])
                    .map_err(|e| Fault::Screen(e.message))?;
                Ok(())
            }
            (OpcodeKind::Var, 0x10) if v >= 4 => {
                self.m.memory.write_word(ops[0] as u32, 1)?;
                self.m.memory.write_word(ops[0] as u32 + 2, 1)?;
                Ok(())
            }
            (OpcodeKind::Var, 0x11) if v >= 4 => {
                self.m
                    .screen
                    .set_text_style(ops[0])
                    .map_err(|e| Fault::Screen(e.message))?;
                Ok(())
            }
            (OpcodeKind::Var, 0x12) if v >= 4 => {
                self.m
                    .screen
                    .buffer_mode(ops[0] != 0)
                    .map_err(|e| Fault::Screen(e.message))?;
                Ok(())
            }
            (OpcodeKind::Var, 0x13) if v >= 3 => {
                self.m
                    .select_output_stream(ops[0] as i16, ops.get(1).copied())?;
                Ok(())
            }
            (OpcodeKind::Var, 0x14) if v >= 3 => {
                debug!("input_stream {} ignored", ops[0]);
                Ok(())
            }
            (OpcodeKind::Var, 0x15) if v >= 3 => {
                debug!("sound_effect ignored");
                Ok(())
            }
            (OpcodeKind::Var, 0x16) if v >= 4 => {
                let code = self.m.read_char_code()?;
                self.store_result(inst, code).map_err(Trap::from)
            }
            (OpcodeKind::Var, 0x17) if v >= 4 => {
                let form = ops.get(3).copied().unwrap_or(0x82);
                let found = scan_table(self.m, ops[0], ops[1], ops[2], form)?;
                self.store_result(inst, found)?;
                self.branch(inst, found != 0)
            }
            (OpcodeKind::Var, 0x18) if v >= 5 => {
                let r = !ops[0];
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Var, 0x19 | 0x1A) if v >= 5 => self.call(ops[0], &ops[1..], None),
            (OpcodeKind::Var, 0x1B) if v >= 5 => {
                tokenise_buffer(self.m, ops[0], ops[1])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x1C) if v >= 5 => {
                encode_text(self.m, ops[0], ops[1], ops[2], ops[3])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x1D) if v >= 5 => {
                copy_table(self.m, ops[0], ops[1], ops[2])?;
                Ok(())
            }
            (OpcodeKind::Var, 0x1E) if v >= 5 => {
                let height = ops.get(2).copied().unwrap_or(1);
                print_table(self.m, ops[0], ops[1], height)?;
                Ok(())
            }
            (OpcodeKind::Var, 0x1F) if v >= 5 => {
                let have = self.frame().arg_count as u16;
                self.branch(inst, have >= ops[0])
            }

            // ---- EXT ----
            (OpcodeKind::Ext, 0x00 | 0x01) => self.store_result(inst, 0).map_err(Trap::from),
            (OpcodeKind::Ext, 0x02) => {
                let places = s(ops[1]);
                let r = if places >= 0 {
                    ops[0].checked_shl(places as u32).unwrap_or(0)
                } else {
                    ops[0].checked_shr(-places as u32).unwrap_or(0)
                };
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Ext, 0x03) => {
                let places = s(ops[1]);
                let r = if places >= 0 {
                    (s(ops[0]).checked_shl(places as u32).unwrap_or(0)) as u16
                } else {
                    s(ops[0])
                        .checked_shr(-places as u32)
                        .unwrap_or(if s(ops[0]) < 0 { -1 } else { 0 }) as u16
                };
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Ext, 0x04) => {
                let r = if ops[0] <= 1 { 1 } else { 0 };
                self.store_result(inst, r).map_err(Trap::from)
            }
            (OpcodeKind::Ext, 0x09) => self.store_result(inst, 0xFFFF).map_err(Trap::from),
            (OpcodeKind::Ext, 0x0A) => self.store_result(inst, 0).map_err(Trap::from),
            (OpcodeKind::Ext, 0x0B) => {
                self.m.print_char_code(ops[0])?;
                Ok(())
            }
            (OpcodeKind::Ext, 0x0C) => self.store_result(inst, 1).map_err(Trap::from),

            _ => Err(Fault::UnknownOpcode {
                kind: inst.kind,
                number: inst.number,
                version: v,
            }
            .into()),
        }
    }

    fn payload_text(&self, inst: &Instruction) -> Result<String, Fault> {
        let words = inst.text.as_ref().ok_or_else(|| Fault::Decode {
            addr: inst.addr,
            reason: "print opcode without text payload".to_string(),
        })?;
        text::decode_payload(words, &self.m.memory, self.m.header.abbrev_table)
    }

    fn do_throw(&mut self, value: u16, token: u16) -> Result<(), Trap> {
        let target = token as usize;
        if target >= self.frames.len() {
            return Err(Fault::UnmatchedThrow.into());
        }
        while self.frames.len() - 1 > target {
            self.frames.pop();
        }
        self.return_from(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ExecMode, RunConfig};
    use crate::fault::{Fault, Termination};
    use crate::testutil::machine_for;

    fn step_config() -> RunConfig {
        RunConfig {
            mode: ExecMode::Step,
            ..RunConfig::default()
        }
    }

    #[test]
    fn arithmetic_and_quit() {
        // add #2 #3 -> G00; quit
        let mut m = machine_for(&[0x14, 0x02, 0x03, 0x10, 0xBA], step_config());
        assert_eq!(m.run().unwrap(), Termination::Quit);
        assert_eq!(m.global_slot(0).unwrap(), 5);
    }

    #[test]
    fn subtraction_wraps_at_zero() {
        let mut m = machine_for(&[0x15, 0x00, 0x01, 0x10, 0xBA], step_config());
        m.run().unwrap();
        assert_eq!(m.global_slot(0).unwrap(), 65535);
    }

    #[test]
    fn call_and_return_store() {
        // main: call 0x380 -> G00; quit
        // routine: 0 locals; rtrue
        let mut code = vec![0u8; 0x110];
        code[..6].copy_from_slice(&[0xE0, 0x3F, 0x03, 0x80, 0x10, 0xBA]);
        code[0x100] = 0x00;
        code[0x101] = 0xB0;
        let mut m = machine_for(&code, step_config());
        m.run().unwrap();
        assert_eq!(m.global_slot(0).unwrap(), 1);
    }

    #[test]
    fn unknown_opcode_reports_version() {
        let mut m = machine_for(&[0x00, 0x01, 0x02, 0xBA], step_config());
        let report = m.run().unwrap_err();
        assert!(matches!(
            report.fault,
            Fault::UnknownOpcode { version: 3, .. }
        ));
    }

    #[test]
    fn main_fallthrough_return_terminates() {
        // main: rtrue — the entry routine returning ends the run
        let mut m = machine_for(&[0xB0], step_config());
        assert_eq!(m.run().unwrap(), Termination::MainReturned);
    }

    #[test]
    fn stack_underflow_faults_cleanly() {
        // ret_popped with an empty stack
        let mut m = machine_for(&[0xB8], step_config());
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, Fault::StackEmpty);
    }
}
