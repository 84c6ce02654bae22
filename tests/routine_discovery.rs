//! Regression pins for routine discovery and graph building on a known
//! image: entry address, locals, instruction count, and the block
//! partition invariant.

mod common;

use common::{echo_chamber, machine, CODE};
use std::collections::HashSet;
use zealous::cfg::{transfers_control, Cfg};
use zealous::config::ExecMode;

#[test]
fn main_routine_discovery_pins() {
    let mut m = machine(echo_chamber(), ExecMode::Jit, true, 42, &[]);
    let main = m.main_routine().unwrap();
    assert_eq!(main.addr, CODE as u32);
    assert_eq!(main.num_locals, 0);
    assert_eq!(main.instructions.len(), 20);
    assert_eq!(main.code_start, CODE as u32);
}

#[test]
fn block_partition_invariant() {
    let mut m = machine(echo_chamber(), ExecMode::Jit, true, 42, &[]);
    let main = m.main_routine().unwrap();
    let cfg = Cfg::build(&main, 3);

    // Every decoded instruction lands in exactly one block.
    let mut seen = HashSet::new();
    for block in &cfg.blocks {
        for inst in &block.instructions {
            assert!(seen.insert(inst.addr), "{:#06x} in two blocks", inst.addr);
        }
    }
    assert_eq!(
        seen.len() + cfg.unreachable.len(),
        main.instructions.len()
    );

    // Block starts are exactly {entry} ∪ {targets} ∪ {else-continuations}.
    let mut expected: HashSet<u32> = HashSet::new();
    expected.insert(main.code_start);
    for inst in &main.instructions {
        if let Some(t) = inst.branch_target_addr() {
            expected.insert(t);
        }
        if let Some(t) = inst.jump_target_addr() {
            expected.insert(t);
        }
        if inst.branch.is_some() {
            expected.insert(inst.next_addr());
        }
    }
    let actual: HashSet<u32> = cfg.blocks.iter().map(|b| b.start).collect();
    assert_eq!(actual, expected);

    // Within a block, only the last instruction may transfer control.
    for block in &cfg.blocks {
        for inst in &block.instructions[..block.instructions.len() - 1] {
            assert!(!transfers_control(inst, 3));
        }
    }
}

#[test]
fn routine_table_caches_descriptors() {
    let mut m = machine(echo_chamber(), ExecMode::Jit, true, 42, &[]);
    let a = m.main_routine().unwrap();
    let b = m.main_routine().unwrap();
    assert!(std::rc::Rc::ptr_eq(&a, &b));
}
