//! Compiled-vs-interpreted parity: both engines, with and without the
//! operand-reuse plan, must produce identical transcripts, identical
//! terminations, and identical machine state on the same scenarios.

mod common;

use common::{echo_chamber, machine, object_gym};
use zealous::config::ExecMode;
use zealous::fault::Termination;
use zealous::machine::Machine;

fn outcomes(mut m: Machine) -> (Termination, String, Vec<u16>) {
    let t = m.run().unwrap();
    let out = m.captured_output().unwrap();
    let globals = (0..8).map(|i| m.global_slot(i).unwrap()).collect();
    (t, out, globals)
}

#[test]
fn echo_chamber_parity() {
    let input = &["take leaflet", "read leaflet", "quit"];
    let jit = outcomes(machine(echo_chamber(), ExecMode::Jit, true, 42, input));
    let jit_plain = outcomes(machine(echo_chamber(), ExecMode::Jit, false, 42, input));
    let step = outcomes(machine(echo_chamber(), ExecMode::Step, true, 42, input));
    assert_eq!(jit, step);
    assert_eq!(jit_plain, step);
}

#[test]
fn object_gym_parity() {
    let jit = outcomes(machine(object_gym(), ExecMode::Jit, true, 7, &[]));
    let jit_plain = outcomes(machine(object_gym(), ExecMode::Jit, false, 7, &[]));
    let step = outcomes(machine(object_gym(), ExecMode::Step, true, 7, &[]));
    assert_eq!(jit, step);
    assert_eq!(jit_plain, step);
}

/// A V5 story where a callee throws back through an intermediate frame:
/// main calls R1, R1 catches and calls R2, R2 throws 77 at R1's token,
/// so R1 returns 77 to main.
fn throw_story() -> Vec<u8> {
    let mut code = vec![0u8; 0x200];
    // main at 0x600: call_vs 0x1C0 -> G00; quit
    code[..6].copy_from_slice(&[0xE0, 0x3F, 0x01, 0xC0, 0x10, 0xBA]);
    // R1 at 0x700 (packed 0x1C0): catch -> G01; call_vs 0x1C4 -> (SP); rtrue
    code[0x100..0x109].copy_from_slice(&[
        0x00, // locals
        0xB9, 0x11, // catch -> G01
        0xE0, 0x3F, 0x01, 0xC4, 0x00, // call_vs 0x1C4 -> (SP)
        0xB0, // rtrue
    ]);
    // R2 at 0x710 (packed 0x1C4): throw #77 G01
    code[0x110..0x114].copy_from_slice(&[0x00, 0x3C, 77, 0x11]);
    common::image_with_code_v(&code, 5)
}

#[test]
fn throw_unwinds_to_the_catching_frame() {
    let run = |mode| {
        let mut m = machine(throw_story(), mode, true, 1, &[]);
        assert_eq!(m.run().unwrap(), Termination::Quit);
        (m.global_slot(0).unwrap(), m.global_slot(1).unwrap())
    };
    // R1 returned the thrown value; its catch token was depth 1.
    assert_eq!(run(ExecMode::Jit), (77, 1));
    assert_eq!(run(ExecMode::Step), (77, 1));
}

#[test]
fn stop_token_interrupts_between_instructions() {
    use std::sync::atomic::Ordering;
    let mut m = machine(echo_chamber(), ExecMode::Jit, true, 42, &["abc"]);
    m.config.stop_check_interval = 1;
    m.stop_handle().store(true, Ordering::Relaxed);
    assert_eq!(m.run().unwrap(), Termination::Interrupted);
}

#[test]
fn parity_preserves_object_tree_mutations() {
    let run = |mode| {
        let mut m = machine(object_gym(), mode, true, 7, &[]);
        m.run().unwrap();
        // the gym removes object 1 from the tree at the end
        let parent = m.objects.parent(&m.memory, 1).unwrap();
        let child = m.objects.child(&m.memory, 2).unwrap();
        let prop = m.objects.get_prop(&m.memory, 1, 5).unwrap();
        (parent, child, prop)
    };
    assert_eq!(run(ExecMode::Jit), run(ExecMode::Step));
    assert_eq!(run(ExecMode::Jit), (0, 0, 99));
}
