//! Operand-reuse planning. When instruction *i* stores its result to the
//! stack and instruction *i+1* immediately consumes the stack top as its
//! first stack operand, the push/pop pair is replaced by an accumulator
//! hand-off. The plan is computed once per block, before generation, and
//! is immutable; generators only read it.
//!
//! This is the one sanctioned check elision: the skipped push/full check
//! could only have faulted on a value that the very next operation
//! removes again. Everything else stays checked.

use crate::instruction::{Instruction, OperandKind};
use std::rc::Rc;

/// Per-instruction fusion decisions handed to a generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fuse {
    /// Route this instruction's store to the accumulator instead of a
    /// stack push.
    pub store: bool,
    /// This instruction's first stack operand reads the accumulator
    /// instead of popping.
    pub load: bool,
}

#[derive(Debug)]
pub struct ReusePlan {
    fuse_after: Vec<bool>,
}

impl ReusePlan {
    pub fn for_block(instructions: &[Rc<Instruction>], enabled: bool) -> ReusePlan {
        let mut fuse_after = vec![false; instructions.len()];
        if enabled {
            for i in 0..instructions.len().saturating_sub(1) {
                fuse_after[i] =
                    leaves_value_on_stack(&instructions[i]) && takes_stack_operand(&instructions[i + 1]);
            }
        }
        ReusePlan { fuse_after }
    }

    pub fn fuse(&self, i: usize) -> Fuse {
        Fuse {
            store: self.fuse_after[i],
            load: i > 0 && self.fuse_after[i - 1],
        }
    }

    pub fn any(&self) -> bool {
        self.fuse_after.iter().any(|b| *b)
    }
}

/// Producer rule: the instruction's final effect is a store to the
/// stack, and it cannot leave the block early (no branch). Every
/// generated op writes its store target as its last effect, so the value
/// is on top of the stack exactly when the next instruction starts.
fn leaves_value_on_stack(inst: &Instruction) -> bool {
    inst.store == Some(0) && inst.branch.is_none()
}

/// Consumer rule: some operand reads the stack. Only the first such
/// operand (in evaluation order) is rewritten; it is the one that would
/// have popped the producer's value.
fn takes_stack_operand(inst: &Instruction) -> bool {
    inst.operands
        .iter()
        .any(|o| o.kind == OperandKind::Variable && o.value == 0)
}
