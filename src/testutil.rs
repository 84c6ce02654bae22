//! Shared fixtures for unit tests: a minimal V3 story image built by
//! hand, with the code region doubling as the entry point.

use crate::config::RunConfig;
use crate::input::ScriptedInput;
use crate::machine::Machine;
use crate::screen_headless::HeadlessScreen;

/// Where test code lands; also the initial PC.
pub const CODE_BASE: usize = 0x600;

/// Assemble a minimal V3 image with `code` at 0x600. Static memory
/// starts at 0x400, globals at 0x100, object table at 0x40, an empty
/// dictionary at 0x2E0. The checksum is made consistent so `verify`
/// succeeds.
pub fn story_with(code: &[u8]) -> Vec<u8> {
    let mut b = vec![0u8; 0x800];
    b[0x00] = 3;
    b[0x06] = 0x06; // initial PC 0x0600
    b[0x07] = 0x00;
    b[0x08] = 0x02; // dictionary 0x02E0
    b[0x09] = 0xE0;
    b[0x0A] = 0x00; // objects 0x0040
    b[0x0B] = 0x40;
    b[0x0C] = 0x01; // globals 0x0100
    b[0x0D] = 0x00;
    b[0x0E] = 0x04; // static memory 0x0400
    b[0x0F] = 0x00;
    b[0x1A] = 0x04; // file length 0x800 (stored halved in V3)
    b[0x1B] = 0x00;
    // empty dictionary: no separators, entry length 7, zero entries
    b[0x2E0] = 0;
    b[0x2E1] = 7;
    b[CODE_BASE..CODE_BASE + code.len()].copy_from_slice(code);
    let sum = b[0x40..].iter().fold(0u16, |s, x| s.wrapping_add(*x as u16));
    b[0x1C] = (sum >> 8) as u8;
    b[0x1D] = sum as u8;
    b
}

pub fn machine_for(code: &[u8], config: RunConfig) -> Machine {
    machine_with_input(code, config, &[])
}

pub fn machine_with_input(code: &[u8], config: RunConfig, lines: &[&str]) -> Machine {
    Machine::with_io(
        story_with(code),
        config,
        Box::new(HeadlessScreen::new()),
        Box::new(ScriptedInput::new(lines.iter().map(|s| s.to_string()))),
    )
    .unwrap()
}
