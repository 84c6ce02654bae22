//! The routine compiler and its cache. A routine is discovered, graphed,
//! and translated block by block on its first call; the unit is cached
//! by address and reused for every later call. Compilation is re-entrant:
//! generated code calling a not-yet-compiled routine lands back here.

pub mod dispatch;
pub mod gen_branch;
pub mod gen_display;
pub mod gen_math;
pub mod gen_memory;
pub mod gen_misc;
pub mod gen_object;
pub mod gen_stack;
pub mod ops;
pub mod reuse;

use crate::cfg::{BasicBlock, Cfg, CfgTarget, EdgeKind};
use crate::fault::{Fault, Trap};
use crate::instruction::{BranchTarget, Instruction};
use crate::machine::Machine;
use crate::routine::Routine;
use dispatch::{ExitSpec, GenCtx};
use log::debug;
use ops::{BlockExit, CompiledBlock, CompiledOp, CompiledRoutine, ExitTarget};
use reuse::ReusePlan;
use std::rc::Rc;

/// Run a machine to termination through the compiled path.
pub fn run(m: &mut Machine) -> Result<(), Trap> {
    let main = m.main_routine()?;
    let unit = unit_for(m, &main)?;
    unit.run(m, &[])?;
    Ok(())
}

/// The call gateway. Marshals 0-7 arguments into the callee's locals,
/// compiling it first if this is its first call. Address 0 yields the
/// documented 0 without a call.
pub fn call_routine(m: &mut Machine, packed: u16, args: &[u16]) -> Result<u16, Trap> {
    if packed == 0 {
        return Ok(0);
    }
    let addr = m.header.unpack_routine(packed);
    let routine = m.routine(addr)?;
    let unit = unit_for(m, &routine)?;
    if m.call_depth >= m.config.call_depth_limit {
        return Err(Fault::CallDepthExceeded(m.config.call_depth_limit).into());
    }
    let args = &args[..args.len().min(7)];
    m.call_depth += 1;
    let result = unit.run(m, args);
    m.call_depth -= 1;
    result
}

/// `GetOrCompile`: at most one unit per address, never recompiled.
pub fn unit_for(m: &mut Machine, routine: &Rc<Routine>) -> Result<Rc<CompiledRoutine>, Fault> {
    if let Some(unit) = m.compiled.get(&routine.addr) {
        return Ok(Rc::clone(unit));
    }
    let unit = Rc::new(compile_routine(m, routine)?);
    m.compiled.insert(routine.addr, Rc::clone(&unit));
    m.hooks.routine_compiled(routine.addr, routine);
    debug!(
        "compiled {} at {:#06x}: {} blocks",
        routine.name.borrow(),
        routine.addr,
        unit.blocks.len()
    );
    Ok(unit)
}

fn compile_routine(m: &Machine, routine: &Routine) -> Result<CompiledRoutine, Fault> {
    let cfg = Cfg::build(routine, m.version());
    let ctx = GenCtx {
        version: m.version(),
        mem: &m.memory,
        abbrev_table: m.header.abbrev_table,
    };
    let mut blocks = Vec::with_capacity(cfg.blocks.len());
    for block in &cfg.blocks {
        blocks.push(compile_block(&ctx, &cfg, block, m.config.reuse_operands)?);
    }
    Ok(CompiledRoutine {
        addr: routine.addr,
        num_locals: routine.num_locals,
        local_defaults: routine.local_defaults.clone(),
        blocks,
        entry: cfg.entry,
    })
}

fn compile_block(
    ctx: &GenCtx,
    cfg: &Cfg,
    block: &BasicBlock,
    reuse: bool,
) -> Result<CompiledBlock, Fault> {
    let plan = ReusePlan::for_block(&block.instructions, reuse);
    let mut ops: Vec<CompiledOp> = Vec::new();
    let mut exit: Option<BlockExit> = None;
    let mut exit_addr = block.start;

    for (i, inst) in block.instructions.iter().enumerate() {
        let out = dispatch::generate(ctx, inst, plan.fuse(i))?;
        for op in out.ops {
            ops.push(CompiledOp {
                addr: inst.addr,
                op,
            });
        }
        if let Some(spec) = out.exit {
            exit = Some(resolve_exit(cfg, inst, spec)?);
            exit_addr = inst.addr;
        }
    }

    let exit = match exit {
        Some(e) => e,
        // No control transfer of its own: follow the fallthrough edge.
        None => match cfg
            .successors(block.id)
            .find(|e| e.kind == EdgeKind::Fallthrough)
        {
            Some(edge) => match edge.to {
                CfgTarget::Block(t) => BlockExit::Jump(t),
                CfgTarget::Exit => BlockExit::NoExit,
            },
            None => BlockExit::NoExit,
        },
    };

    Ok(CompiledBlock {
        start: block.start,
        ops,
        exit,
        exit_addr,
    })
}

fn resolve_exit(cfg: &Cfg, inst: &Instruction, spec: ExitSpec) -> Result<BlockExit, Fault> {
    let block_for = |addr: u32| {
        cfg.block_at(addr).ok_or_else(|| Fault::Decode {
            addr: inst.addr,
            reason: format!("control transfer into unmapped address {addr:#06x}"),
        })
    };
    Ok(match spec {
        ExitSpec::Branch(cond) => {
            let b = inst.branch.ok_or_else(|| Fault::Decode {
                addr: inst.addr,
                reason: "branch generator on a non-branch instruction".to_string(),
            })?;
            let taken = match b.target {
                BranchTarget::ReturnTrue => ExitTarget::ReturnTrue,
                BranchTarget::ReturnFalse => ExitTarget::ReturnFalse,
                BranchTarget::Offset(_) => {
                    ExitTarget::Block(block_for(inst.branch_target_addr().unwrap())?)
                }
            };
            BlockExit::Branch {
                cond,
                on_true: b.on_true,
                taken,
                fall: block_for(inst.next_addr())?,
            }
        }
        ExitSpec::Jump => match inst.jump_target_addr() {
            Some(target) => BlockExit::Jump(block_for(target)?),
            // A jump through a variable defeats static control flow.
            None => BlockExit::ComputedJump,
        },
        ExitSpec::Return(src) => BlockExit::Return(src),
        ExitSpec::Quit => BlockExit::Quit,
        ExitSpec::Restart => BlockExit::Restart,
        ExitSpec::Throw { value, frame } => BlockExit::Throw { value, frame },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::fault::{Fault, Termination};
    use crate::instruction::OpcodeKind;
    use crate::testutil::{machine_for, CODE_BASE};

    fn run_code(code: &[u8]) -> (Machine, Result<Termination, crate::fault::FaultReport>) {
        let mut m = machine_for(code, RunConfig::default());
        let r = m.run();
        (m, r)
    }

    #[test]
    fn compiles_and_runs_arithmetic() {
        // add #2 #3 -> G00; quit
        let (m, r) = run_code(&[0x14, 0x02, 0x03, 0x10, 0xBA]);
        assert_eq!(r.unwrap(), Termination::Quit);
        assert_eq!(m.global_slot(0).unwrap(), 5);
    }

    #[test]
    fn signed_wraparound_subtraction() {
        // sub #0 #1 -> G00; quit
        let (m, r) = run_code(&[0x15, 0x00, 0x01, 0x10, 0xBA]);
        assert_eq!(r.unwrap(), Termination::Quit);
        assert_eq!(m.global_slot(0).unwrap(), 65535);
    }

    #[test]
    fn division_by_zero_faults() {
        // div #8 #0 -> G00
        let (_, r) = run_code(&[0x17, 0x08, 0x00, 0x10, 0xBA]);
        let report = r.unwrap_err();
        assert_eq!(report.fault, Fault::DivisionByZero);
        assert_eq!(report.addr, CODE_BASE as u32);
    }

    #[test]
    fn unknown_opcode_faults_deterministically() {
        // 2OP opcode 0 exists in no version: long form byte 0x00
        let (_, r) = run_code(&[0x00, 0x01, 0x02, 0xBA]);
        let report = r.unwrap_err();
        assert!(matches!(
            report.fault,
            Fault::UnknownOpcode {
                kind: OpcodeKind::Op2,
                number: 0x00,
                version: 3
            }
        ));
    }

    #[test]
    fn call_gateway_fills_locals_from_args_and_defaults() {
        // Routine at 0x700 (packed 0x380): 3 locals with defaults
        // (7, 8, 9); stores L00+L01 into G00 and L02 into G01.
        let mut code = vec![0u8; 0x200];
        // main at 0x600: call 0x380 #5 #6 -> (SP); quit
        let main = [
            0xE0, 0x17, 0x03, 0x80, 0x05, 0x06, 0x00, // call_vs
            0xBA, // quit
        ];
        code[..main.len()].copy_from_slice(&main);
        let routine = [
            0x03, 0x00, 0x07, 0x00, 0x08, 0x00, 0x09, // 3 locals: 7, 8, 9
            0x74, 0x01, 0x02, 0x10, // add L00 L01 -> G00
            0x54, 0x03, 0x00, 0x11, // add L02 #0 -> G01
            0xB1, // rfalse
        ];
        code[0x100..0x100 + routine.len()].copy_from_slice(&routine);

        let mut m = machine_for(&code, RunConfig::default());
        let r = m.run().unwrap();
        assert_eq!(r, Termination::Quit);
        // args 5 and 6 overrode the first two defaults; the third kept 9
        assert_eq!(m.global_slot(0).unwrap(), 11);
        assert_eq!(m.global_slot(1).unwrap(), 9);
    }

    #[test]
    fn compile_cache_is_idempotent() {
        let mut routine_code = vec![0u8; 0x110];
        routine_code[0] = 0xBA; // main: quit
        routine_code[0x100] = 0x00; // routine: 0 locals
        routine_code[0x101] = 0xB0; // rtrue

        let mut m = machine_for(&routine_code, RunConfig::default());
        let addr = (CODE_BASE + 0x100) as u32;
        let routine = m.routine(addr).unwrap();
        let first = unit_for(&mut m, &routine).unwrap();
        let second = unit_for(&mut m, &routine).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(m.compiled.len(), 1);
    }

    #[test]
    fn recursion_hits_depth_limit() {
        // Routine at 0x700 calls itself forever.
        let mut code = vec![0u8; 0x200];
        let main = [
            0xE0, 0x3F, 0x03, 0x80, 0x00, // call 0x380 -> (SP)
            0xBA, // quit
        ];
        code[..main.len()].copy_from_slice(&main);
        let routine = [
            0x00, // 0 locals
            0xE0, 0x3F, 0x03, 0x80, 0x00, // call 0x380 -> (SP)
            0xB0, // rtrue
        ];
        code[0x100..0x100 + routine.len()].copy_from_slice(&routine);

        let mut config = RunConfig::default();
        config.call_depth_limit = 20;
        let mut m = machine_for(&code, config);
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, Fault::CallDepthExceeded(20));
    }

    #[test]
    fn reuse_plan_does_not_change_results() {
        // add #2 #3 -> (SP); sub (SP) #1 -> G00; quit
        let code = [
            0x14, 0x02, 0x03, 0x00, //
            0x55, 0x00, 0x01, 0x10, //
            0xBA,
        ];
        let mut fused = machine_for(&code, RunConfig::default());
        fused.run().unwrap();

        let mut config = RunConfig::default();
        config.reuse_operands = false;
        let mut plain = machine_for(&code, config);
        plain.run().unwrap();

        assert_eq!(fused.global_slot(0).unwrap(), 4);
        assert_eq!(plain.global_slot(0).unwrap(), 4);
        assert_eq!(fused.stack.depth(), plain.stack.depth());
    }

    #[test]
    fn branching_loop_executes() {
        // G00 starts at 0; loop: inc G00; je G00 #5 [FALSE: back to inc]
        // then quit. Verifies block wiring for backward branches.
        //   0x600: inc G00
        //   0x602: je G00 #5, branch-on-false back to 0x600 (2-byte form)
        let code = [
            0x95, 0x10, // inc G00
            0x41, 0x10, 0x05, 0x3F, 0xFB, // je G00 #05 [FALSE: 0x600]
            0xBA, // quit
        ];
        let (m, r) = run_code(&code);
        assert_eq!(r.unwrap(), Termination::Quit);
        assert_eq!(m.global_slot(0).unwrap(), 5);
    }
}
