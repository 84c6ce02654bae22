//! Shared scenario-test machinery: a two-pass mini assembler and a pair
//! of hand-built V3 story images.

use zealous::config::{ExecMode, RunConfig};
use zealous::input::ScriptedInput;
use zealous::machine::Machine;
use zealous::screen_headless::HeadlessScreen;
use zealous::text::encode_string;
use std::collections::HashMap;

/// Fixed layout of the synthetic images.
pub const OBJECTS: usize = 0x040;
pub const GLOBALS: usize = 0x100;
pub const TEXT_BUF: usize = 0x2E0;
pub const PARSE_BUF: usize = 0x320;
pub const DICTIONARY: usize = 0x360;
pub const STATIC_BASE: usize = 0x400;
pub const CODE: usize = 0x600;
pub const FILE_LEN: usize = 0x1000;

enum Fixup {
    /// 2-byte branch placeholder at this offset.
    Branch { at: usize, on_true: bool, label: &'static str },
    /// `jump` with a 2-byte offset operand at this offset.
    Jump { at: usize, label: &'static str },
}

/// A tiny two-pass assembler: emit raw bytes, drop labels, and let
/// branch/jump offsets resolve at the end.
pub struct Asm {
    base: usize,
    pub bytes: Vec<u8>,
    labels: HashMap<&'static str, usize>,
    fixups: Vec<Fixup>,
}

impl Asm {
    pub fn new(base: usize) -> Asm {
        Asm {
            base,
            bytes: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    pub fn here(&self) -> usize {
        self.base + self.bytes.len()
    }

    pub fn label(&mut self, name: &'static str) {
        self.labels.insert(name, self.here());
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// `print` / `print_ret` embedded text payload.
    pub fn ztext(&mut self, text: &str) -> &mut Self {
        for w in encode_string(text) {
            self.bytes.extend_from_slice(&w.to_be_bytes());
        }
        self
    }

    /// Emit a 2-byte branch to `label` (resolved in `finish`).
    pub fn branch_to(&mut self, on_true: bool, label: &'static str) -> &mut Self {
        self.fixups.push(Fixup::Branch {
            at: self.bytes.len(),
            on_true,
            label,
        });
        self.raw(&[0, 0])
    }

    /// Emit `jump <label>` (opcode + 2-byte signed offset).
    pub fn jump_to(&mut self, label: &'static str) -> &mut Self {
        self.raw(&[0x8C]);
        self.fixups.push(Fixup::Jump {
            at: self.bytes.len(),
            label,
        });
        self.raw(&[0, 0])
    }

    pub fn finish(mut self) -> Vec<u8> {
        for fixup in &self.fixups {
            match fixup {
                Fixup::Branch { at, on_true, label } => {
                    let target = self.labels[label] as i64;
                    // target = (addr_after_branch_bytes) + offset - 2
                    let offset = target - (self.base + at) as i64;
                    assert!((-0x2000..0x2000).contains(&offset), "branch out of range");
                    let enc = (offset as u16) & 0x3FFF;
                    self.bytes[*at] = ((*on_true as u8) << 7) | (enc >> 8) as u8;
                    self.bytes[*at + 1] = enc as u8;
                }
                Fixup::Jump { at, label } => {
                    let target = self.labels[label] as i64;
                    // target = next_addr + operand - 2; operand bytes at `at`
                    let offset = target - (self.base + at + 2) as i64 + 2;
                    let enc = offset as i16 as u16;
                    self.bytes[*at] = (enc >> 8) as u8;
                    self.bytes[*at + 1] = enc as u8;
                }
            }
        }
        self.bytes
    }
}

/// Common image scaffolding: header, globals, buffers, dictionary with a
/// few words, and `code` at the entry point.
pub fn image_with_code(code: &[u8]) -> Vec<u8> {
    image_with_code_v(code, 3)
}

pub fn image_with_code_v(code: &[u8], version: u8) -> Vec<u8> {
    let mut b = vec![0u8; FILE_LEN];
    b[0x00] = version;
    word(&mut b, 0x06, CODE as u16); // initial PC
    word(&mut b, 0x08, DICTIONARY as u16);
    word(&mut b, 0x0A, OBJECTS as u16);
    word(&mut b, 0x0C, GLOBALS as u16);
    word(&mut b, 0x0E, STATIC_BASE as u16);
    let len_scale = if version <= 3 { 2 } else { 4 };
    word(&mut b, 0x1A, (FILE_LEN / len_scale) as u16);

    // input buffers: capacity bytes
    b[TEXT_BUF] = 59;
    b[PARSE_BUF] = 8;

    // dictionary: one separator, 7-byte entries, three words
    let words = ["mailbox", "open", "quit"];
    b[DICTIONARY] = 1;
    b[DICTIONARY + 1] = b',';
    b[DICTIONARY + 2] = 7;
    word(&mut b, DICTIONARY + 3, words.len() as u16);
    let mut at = DICTIONARY + 5;
    for w in words {
        let enc = zealous::text::encode_word(w, 3);
        b[at..at + 4].copy_from_slice(&enc);
        at += 7;
    }

    build_objects(&mut b);

    b[CODE..CODE + code.len()].copy_from_slice(code);

    let sum = b[0x40..].iter().fold(0u16, |s, x| s.wrapping_add(*x as u16));
    word(&mut b, 0x1C, sum);
    b
}

fn word(b: &mut [u8], at: usize, v: u16) {
    b[at] = (v >> 8) as u8;
    b[at + 1] = v as u8;
}

/// Two objects: 1 "box" (property 5, one byte, initially 0) and 2 "room"
/// (no properties). Property 4 defaults to 7. The box starts outside the
/// tree.
fn build_objects(b: &mut [u8]) {
    // defaults table: prop 4 -> 7
    word(b, OBJECTS + 3 * 2, 7);

    let entries = OBJECTS + 31 * 2;
    let props1 = 0xC0;
    let props2 = 0xE0;
    // object 1
    word(b, entries + 7, props1 as u16);
    // object 2
    word(b, entries + 9 + 7, props2 as u16);

    // object 1 property table: name "box", prop 5 (1 byte) = 0
    let name1 = encode_string("box");
    b[props1] = name1.len() as u8;
    let mut at = props1 + 1;
    for w in &name1 {
        word(b, at, *w);
        at += 2;
    }
    b[at] = 5; // size byte: len 1, prop 5
    b[at + 1] = 0;
    b[at + 2] = 0; // terminator

    // object 2 property table: name "room", no props
    let name2 = encode_string("room");
    b[props2] = name2.len() as u8;
    let mut at = props2 + 1;
    for w in &name2 {
        word(b, at, *w);
        at += 2;
    }
    b[at] = 0;
}

/// The transcript story: prints a banner, echoes every input line back,
/// and quits when a line starts with 'q'. Exercises embedded text,
/// random, input, tokenization, byte loads, branches and loops.
pub fn echo_chamber() -> Vec<u8> {
    let mut a = Asm::new(CODE);

    // print "Echo Chamber\n"
    a.raw(&[0xB2]).ztext("Echo Chamber\n");
    // random #1 -> G01  (range 1 draws 1: deterministic across seeds)
    a.raw(&[0xE7, 0x7F, 0x01, 0x11]);
    // print "calibration: "
    a.raw(&[0xB2]).ztext("calibration: ");
    // print_num G01
    a.raw(&[0xE6, 0xBF, 0x11]);
    // new_line
    a.raw(&[0xBB]);

    a.label("loop");
    // sread TEXT_BUF PARSE_BUF
    a.raw(&[0xE4, 0x0F]);
    a.raw(&(TEXT_BUF as u16).to_be_bytes());
    a.raw(&(PARSE_BUF as u16).to_be_bytes());
    // store G02 #1  (cursor into the text buffer)
    a.raw(&[0x0D, 0x12, 0x01]);

    a.label("echo");
    // loadb TEXT_BUF G02 -> (SP)
    a.raw(&[0xD0, 0x2F]);
    a.raw(&(TEXT_BUF as u16).to_be_bytes());
    a.raw(&[0x12, 0x00]);
    // jz (SP) [TRUE: done]
    a.raw(&[0xA0, 0x00]).branch_to(true, "done");
    // loadb TEXT_BUF G02 -> (SP)
    a.raw(&[0xD0, 0x2F]);
    a.raw(&(TEXT_BUF as u16).to_be_bytes());
    a.raw(&[0x12, 0x00]);
    // print_char (SP)
    a.raw(&[0xE5, 0xBF, 0x00]);
    // inc G02
    a.raw(&[0x95, 0x12]);
    a.jump_to("echo");

    a.label("done");
    // new_line
    a.raw(&[0xBB]);
    // loadb TEXT_BUF #1 -> (SP)
    a.raw(&[0xD0, 0x1F]);
    a.raw(&(TEXT_BUF as u16).to_be_bytes());
    a.raw(&[0x01, 0x00]);
    // je (SP) #'q' [TRUE: farewell]
    a.raw(&[0x41, 0x00, b'q']).branch_to(true, "farewell");
    a.jump_to("loop");

    a.label("farewell");
    // print "Goodbye."
    a.raw(&[0xB2]).ztext("Goodbye.");
    // new_line; quit
    a.raw(&[0xBB, 0xBA]);

    image_with_code(&a.finish())
}

/// The object workout: tree surgery, attributes, properties, counted
/// loops and explicit stack traffic, all through print statements so the
/// transcript pins every result.
pub fn object_gym() -> Vec<u8> {
    let mut a = Asm::new(CODE);

    // insert_obj #1 #2
    a.raw(&[0x0E, 0x01, 0x02]);
    // set_attr #1 #7
    a.raw(&[0x0B, 0x01, 0x07]);
    // test_attr #1 #7 [TRUE: attr-ok]
    a.raw(&[0x0A, 0x01, 0x07]).branch_to(true, "attr_ok");
    a.raw(&[0xB2]).ztext("attr missing\n");
    a.label("attr_ok");
    // get_child #2 -> (SP) [TRUE: child-ok]
    a.raw(&[0x92, 0x02, 0x00]).branch_to(true, "child_ok");
    a.raw(&[0xB2]).ztext("no child\n");
    a.label("child_ok");
    // print_obj (SP); new_line
    a.raw(&[0xAA, 0x00, 0xBB]);
    // put_prop #1 #5 #99
    a.raw(&[0xE3, 0x57, 0x01, 0x05, 99]);
    // get_prop #1 #5 -> G00; print_num G00; new_line
    a.raw(&[0x11, 0x01, 0x05, 0x10]);
    a.raw(&[0xE6, 0xBF, 0x10, 0xBB]);
    // get_prop #1 #4 -> G01 (absent: defaults to 7); print_num; new_line
    a.raw(&[0x11, 0x01, 0x04, 0x11]);
    a.raw(&[0xE6, 0xBF, 0x11, 0xBB]);
    // store G02 #0
    a.raw(&[0x0D, 0x12, 0x00]);
    a.label("count");
    // inc_chk G02 #5 [FALSE: count]
    a.raw(&[0x05, 0x12, 0x05]).branch_to(false, "count");
    // print_num G02; new_line
    a.raw(&[0xE6, 0xBF, 0x12, 0xBB]);
    // push #21; push #22; pull G03
    a.raw(&[0xE8, 0x7F, 21]);
    a.raw(&[0xE8, 0x7F, 22]);
    a.raw(&[0xE9, 0x7F, 0x13]);
    // print_num G03; print_char ' '; print_num (SP); new_line
    a.raw(&[0xE6, 0xBF, 0x13]);
    a.raw(&[0xE5, 0x7F, b' ']);
    a.raw(&[0xE6, 0xBF, 0x00, 0xBB]);
    // remove_obj #1; get_child #2 -> (SP) [TRUE: still]
    a.raw(&[0x99, 0x01]);
    a.raw(&[0x92, 0x02, 0x00]).branch_to(true, "still");
    a.raw(&[0xB2]).ztext("empty again\n");
    a.label("still");
    // quit
    a.raw(&[0xBA]);

    image_with_code(&a.finish())
}

pub const OBJECT_GYM_EXPECTED: &str = "box\n99\n7\n6\n22 21\nempty again\n";

pub fn machine(
    story: Vec<u8>,
    mode: ExecMode,
    reuse: bool,
    seed: u64,
    inputs: &[&str],
) -> Machine {
    let config = RunConfig {
        mode,
        reuse_operands: reuse,
        seed: Some(seed),
        ..RunConfig::default()
    };
    Machine::with_io(
        story,
        config,
        Box::new(HeadlessScreen::new()),
        Box::new(ScriptedInput::new(inputs.iter().map(|s| s.to_string()))),
    )
    .unwrap()
}
