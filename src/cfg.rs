//! Per-routine control-flow graph. Blocks partition the instruction list
//! at branch/jump targets and else-continuations; edges drive code
//! generation order. Built per compile and discarded.

use crate::instruction::{BranchTarget, Instruction};
use crate::routine::Routine;
use log::warn;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgTarget {
    Block(usize),
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Fallthrough,
    BranchTaken,
    BranchNotTaken,
    Jump,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgEdge {
    pub from: usize,
    pub to: CfgTarget,
    pub kind: EdgeKind,
}

pub struct BasicBlock {
    pub id: usize,
    pub start: u32,
    pub instructions: Vec<Rc<Instruction>>,
}

pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<CfgEdge>,
    /// Block the synthetic Entry node leads to.
    pub entry: usize,
    /// Instruction addresses dropped as unreachable (diagnostic only).
    pub unreachable: Vec<u32>,
    block_by_addr: HashMap<u32, usize>,
}

impl Cfg {
    pub fn build(routine: &Routine, version: u8) -> Cfg {
        // Pass 1: every address that must start a block.
        let mut starts: BTreeSet<u32> = BTreeSet::new();
        starts.insert(routine.code_start);
        for inst in &routine.instructions {
            if let Some(target) = inst.branch_target_addr() {
                starts.insert(target);
            }
            if let Some(target) = inst.jump_target_addr() {
                starts.insert(target);
            }
            if inst.branch.is_some() {
                // The "else" continuation after a conditional branch.
                starts.insert(inst.next_addr());
            }
        }

        // Pass 2: walk in address order, opening blocks at start
        // addresses and closing after every control transfer.
        let mut cfg = Cfg {
            blocks: Vec::new(),
            edges: Vec::new(),
            entry: 0,
            unreachable: Vec::new(),
            block_by_addr: HashMap::new(),
        };
        let mut pending: Vec<(usize, u32, EdgeKind)> = Vec::new();
        let mut current: Option<usize> = None;

        for inst in &routine.instructions {
            if starts.contains(&inst.addr) {
                let id = cfg.open_block(inst.addr);
                if let Some(prev) = current {
                    pending.push((prev, inst.addr, EdgeKind::Fallthrough));
                }
                current = Some(id);
            }
            let Some(cur) = current else {
                warn!(
                    "unreachable instruction at {:#06x} dropped from graph",
                    inst.addr
                );
                cfg.unreachable.push(inst.addr);
                continue;
            };
            cfg.blocks[cur].instructions.push(Rc::clone(inst));

            if let Some(branch) = inst.branch {
                match branch.target {
                    BranchTarget::Offset(_) => {
                        let target = inst.branch_target_addr().unwrap();
                        pending.push((cur, target, EdgeKind::BranchTaken));
                    }
                    BranchTarget::ReturnTrue | BranchTarget::ReturnFalse => {
                        cfg.edges.push(CfgEdge {
                            from: cur,
                            to: CfgTarget::Exit,
                            kind: EdgeKind::BranchTaken,
                        });
                    }
                }
                pending.push((cur, inst.next_addr(), EdgeKind::BranchNotTaken));
                current = None;
            } else if inst.is_jump() {
                if let Some(target) = inst.jump_target_addr() {
                    pending.push((cur, target, EdgeKind::Jump));
                }
                current = None;
            } else if inst.is_terminal(version) {
                cfg.edges.push(CfgEdge {
                    from: cur,
                    to: CfgTarget::Exit,
                    kind: EdgeKind::Return,
                });
                current = None;
            }
        }

        // Resolve address-targeted edges now that all blocks exist. A
        // target that is not a decoded instruction (overlapping or
        // malformed code) gets no edge; executing that transfer faults
        // in the generated code.
        for (from, addr, kind) in pending {
            match cfg.block_by_addr.get(&addr) {
                Some(&to) => cfg.edges.push(CfgEdge {
                    from,
                    to: CfgTarget::Block(to),
                    kind,
                }),
                None => warn!(
                    "control transfer from block {} to {:#06x} has no block",
                    from, addr
                ),
            }
        }

        cfg
    }

    fn open_block(&mut self, start: u32) -> usize {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock {
            id,
            start,
            instructions: Vec::new(),
        });
        self.block_by_addr.insert(start, id);
        id
    }

    pub fn block_at(&self, addr: u32) -> Option<usize> {
        self.block_by_addr.get(&addr).copied()
    }

    pub fn successors(&self, id: usize) -> impl Iterator<Item = &CfgEdge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Blocks with no outgoing edges at all; tolerated, diagnosed.
    pub fn dead_end_blocks(&self) -> Vec<usize> {
        (0..self.blocks.len())
            .filter(|id| self.successors(*id).next().is_none())
            .collect()
    }
}

/// True when this instruction ends a basic block (used by tests and
/// diagnostics to sanity-check partitions).
pub fn transfers_control(inst: &Instruction, version: u8) -> bool {
    inst.branch.is_some() || inst.is_jump() || inst.is_terminal(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionCache;
    use crate::memory::Memory;
    use test_log::test;

    fn build_routine(code: &[u8]) -> Routine {
        let mut bytes = vec![0u8; 0x40];
        bytes.extend_from_slice(code);
        bytes.resize(bytes.len() + 8, 0);
        let mem = Memory::new(bytes, 0x40);
        let mut cache = InstructionCache::new();
        Routine::build(&mem, &mut cache, 0x40, 3).unwrap()
    }

    /// jz (SP) [TRUE: +3 → skip the nop]; nop; rtrue
    fn branchy_routine() -> Routine {
        build_routine(&[
            0x00, // locals
            0xA0, 0x00, 0xC3, // 0x41: jz (SP) [TRUE: 0x45]
            0xB4, // 0x44: nop
            0xB0, // 0x45: rtrue
        ])
    }

    #[test]
    fn partitions_at_targets_and_continuations() {
        let r = branchy_routine();
        let cfg = Cfg::build(&r, 3);
        let starts: Vec<u32> = cfg.blocks.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0x41, 0x44, 0x45]);

        // Every instruction is in exactly one block.
        let mut seen = std::collections::HashSet::new();
        for b in &cfg.blocks {
            for i in &b.instructions {
                assert!(seen.insert(i.addr));
            }
        }
        assert_eq!(seen.len(), r.instructions.len());
    }

    #[test]
    fn edges_cover_taken_and_untaken_paths() {
        let r = branchy_routine();
        let cfg = Cfg::build(&r, 3);
        let from_entry: Vec<(CfgTarget, EdgeKind)> = cfg
            .successors(0)
            .map(|e| (e.to, e.kind))
            .collect();
        assert!(from_entry.contains(&(CfgTarget::Block(2), EdgeKind::BranchTaken)));
        assert!(from_entry.contains(&(CfgTarget::Block(1), EdgeKind::BranchNotTaken)));

        // nop block falls through into the rtrue block.
        assert!(cfg
            .successors(1)
            .any(|e| e.to == CfgTarget::Block(2) && e.kind == EdgeKind::Fallthrough));
        // rtrue exits.
        assert!(cfg
            .successors(2)
            .any(|e| e.to == CfgTarget::Exit && e.kind == EdgeKind::Return));
    }

    #[test]
    fn return_branches_route_to_exit() {
        // jz (SP) [TRUE: RTRUE]; rfalse
        let r = build_routine(&[0x00, 0xA0, 0x00, 0xC1, 0xB1]);
        let cfg = Cfg::build(&r, 3);
        assert!(cfg
            .successors(0)
            .any(|e| e.to == CfgTarget::Exit && e.kind == EdgeKind::BranchTaken));
    }

    #[test]
    fn unreachable_code_is_dropped_not_fatal() {
        // jump skips two nops that nothing targets:
        //   0x41: jump 0x46
        //   0x44: nop        (unreachable)
        //   0x45: nop        (unreachable)
        //   0x46: rtrue
        let r = build_routine(&[0x00, 0x8C, 0x00, 0x04, 0xB4, 0xB4, 0xB0]);
        let cfg = Cfg::build(&r, 3);
        assert_eq!(cfg.unreachable, vec![0x44, 0x45]);
        let total: usize = cfg.blocks.iter().map(|b| b.instructions.len()).sum();
        assert_eq!(total + cfg.unreachable.len(), r.instructions.len());
    }

    #[test]
    fn jump_edge_lands_on_target_block() {
        let r = build_routine(&[0x00, 0x8C, 0x00, 0x04, 0xB4, 0xB4, 0xB0]);
        let cfg = Cfg::build(&r, 3);
        let target = cfg.block_at(0x46).unwrap();
        assert!(cfg
            .successors(0)
            .any(|e| e.to == CfgTarget::Block(target) && e.kind == EdgeKind::Jump));
    }
}
