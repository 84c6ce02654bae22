//! Static opcode facts: names, store/branch/text presence, all keyed by
//! (kind, number, version). Pure lookup functions; several opcode numbers
//! change meaning between versions and are gated here in one place.

use crate::instruction::OpcodeKind;

pub fn name(kind: OpcodeKind, number: u8, version: u8) -> &'static str {
    match kind {
        OpcodeKind::Op0 => op0_name(number, version),
        OpcodeKind::Op1 => op1_name(number, version),
        OpcodeKind::Op2 => op2_name(number),
        OpcodeKind::Var => var_name(number, version),
        OpcodeKind::Ext => ext_name(number),
    }
}

fn op2_name(number: u8) -> &'static str {
    match number {
        0x01 => "je",
        0x02 => "jl",
        0x03 => "jg",
        0x04 => "dec_chk",
        0x05 => "inc_chk",
        0x06 => "jin",
        0x07 => "test",
        0x08 => "or",
        0x09 => "and",
        0x0A => "test_attr",
        0x0B => "set_attr",
        0x0C => "clear_attr",
        0x0D => "store",
        0x0E => "insert_obj",
        0x0F => "loadw",
        0x10 => "loadb",
        0x11 => "get_prop",
        0x12 => "get_prop_addr",
        0x13 => "get_next_prop",
        0x14 => "add",
        0x15 => "sub",
        0x16 => "mul",
        0x17 => "div",
        0x18 => "mod",
        0x19 => "call_2s",
        0x1A => "call_2n",
        0x1B => "set_colour",
        0x1C => "throw",
        _ => "unknown_2op",
    }
}

fn op1_name(number: u8, version: u8) -> &'static str {
    match number {
        0x00 => "jz",
        0x01 => "get_sibling",
        0x02 => "get_child",
        0x03 => "get_parent",
        0x04 => "get_prop_len",
        0x05 => "inc",
        0x06 => "dec",
        0x07 => "print_addr",
        0x08 => "call_1s",
        0x09 => "remove_obj",
        0x0A => "print_obj",
        0x0B => "ret",
        0x0C => "jump",
        0x0D => "print_paddr",
        0x0E => "load",
        0x0F => {
            if version <= 4 {
                "not"
            } else {
                "call_1n"
            }
        }
        _ => "unknown_1op",
    }
}

fn op0_name(number: u8, version: u8) -> &'static str {
    match number {
        0x00 => "rtrue",
        0x01 => "rfalse",
        0x02 => "print",
        0x03 => "print_ret",
        0x04 => "nop",
        0x05 => "save",
        0x06 => "restore",
        0x07 => "restart",
        0x08 => "ret_popped",
        0x09 => {
            if version <= 4 {
                "pop"
            } else {
                "catch"
            }
        }
        0x0A => "quit",
        0x0B => "new_line",
        0x0C => "show_status",
        0x0D => "verify",
        0x0E => "extended",
        0x0F => "piracy",
        _ => "unknown_0op",
    }
}

fn var_name(number: u8, version: u8) -> &'static str {
    match number {
        0x00 => "call_vs",
        0x01 => "storew",
        0x02 => "storeb",
        0x03 => "put_prop",
        0x04 => {
            if version <= 4 {
                "sread"
            } else {
                "aread"
            }
        }
        0x05 => "print_char",
        0x06 => "print_num",
        0x07 => "random",
        0x08 => "push",
        0x09 => "pull",
        0x0A => "split_window",
        0x0B => "set_window",
        0x0C => "call_vs2",
        0x0D => "erase_window",
        0x0E => "erase_line",
        0x0F => "set_cursor",
        0x10 => "get_cursor",
        0x11 => "set_text_style",
        0x12 => "buffer_mode",
        0x13 => "output_stream",
        0x14 => "input_stream",
        0x15 => "sound_effect",
        0x16 => "read_char",
        0x17 => "scan_table",
        0x18 => "not",
        0x19 => "call_vn",
        0x1A => "call_vn2",
        0x1B => "tokenise",
        0x1C => "encode_text",
        0x1D => "copy_table",
        0x1E => "print_table",
        0x1F => "check_arg_count",
        _ => "unknown_var",
    }
}

fn ext_name(number: u8) -> &'static str {
    match number {
        0x00 => "save",
        0x01 => "restore",
        0x02 => "log_shift",
        0x03 => "art_shift",
        0x04 => "set_font",
        0x09 => "save_undo",
        0x0A => "restore_undo",
        0x0B => "print_unicode",
        0x0C => "check_unicode",
        _ => "unknown_ext",
    }
}

/// Does this instruction carry a store byte?
pub fn stores_result(kind: OpcodeKind, number: u8, version: u8) -> bool {
    match kind {
        OpcodeKind::Op2 => matches!(number, 0x08..=0x09 | 0x0F..=0x13 | 0x14..=0x18 | 0x19),
        OpcodeKind::Op1 => match number {
            0x01..=0x04 | 0x08 | 0x0E => true,
            0x0F => version <= 4, // not stores; call_1n (V5+) does not
            _ => false,
        },
        OpcodeKind::Op0 => match number {
            0x05 | 0x06 => version == 4, // save/restore become store-form in V4
            0x09 => version >= 5,        // catch
            _ => false,
        },
        OpcodeKind::Var => match number {
            0x00 | 0x07 | 0x0C | 0x16 | 0x17 => true,
            0x04 => version >= 5, // aread stores the terminator
            0x18 => version >= 5, // not moved to VAR in V5
            _ => false,
        },
        OpcodeKind::Ext => matches!(number, 0x00..=0x04 | 0x09 | 0x0A | 0x0C),
    }
}

/// Does this instruction carry branch bytes?
pub fn has_branch(kind: OpcodeKind, number: u8, version: u8) -> bool {
    match kind {
        OpcodeKind::Op2 => matches!(number, 0x01..=0x07 | 0x0A),
        OpcodeKind::Op1 => matches!(number, 0x00..=0x02),
        OpcodeKind::Op0 => match number {
            0x05 | 0x06 => version <= 3, // save/restore branch in V1-3
            0x0D | 0x0F => true,         // verify, piracy
            _ => false,
        },
        OpcodeKind::Var => match number {
            0x17 => true,            // scan_table
            0x1F => version >= 5,    // check_arg_count
            _ => false,
        },
        OpcodeKind::Ext => false,
    }
}

/// Does this instruction embed a packed text payload?
pub fn has_text(kind: OpcodeKind, number: u8) -> bool {
    kind == OpcodeKind::Op0 && matches!(number, 0x02 | 0x03)
}

/// Fewest operands an opcode can execute with. The variable-operand
/// encodings can legally supply fewer than an opcode needs; running such
/// an instruction is a decode fault, not an index panic.
pub fn min_operands(kind: OpcodeKind, number: u8, version: u8) -> usize {
    match kind {
        OpcodeKind::Op2 => 2,
        OpcodeKind::Op1 => 1,
        OpcodeKind::Op0 => 0,
        OpcodeKind::Var => match number {
            0x01 | 0x02 | 0x03 | 0x17 | 0x1D => 3, // storew, storeb, put_prop, scan_table, copy_table
            0x0F | 0x1B | 0x1E => 2,               // set_cursor, tokenise, print_table
            0x1C => 4,                             // encode_text
            0x15 | 0x16 => 0,                      // sound_effect, read_char
            0x04 => {
                if version <= 3 {
                    2 // sread: text and parse
                } else {
                    1
                }
            }
            _ => 1,
        },
        OpcodeKind::Ext => match number {
            0x02 | 0x03 => 2, // shifts
            0x04 | 0x0B | 0x0C => 1,
            _ => 0,
        },
    }
}

/// Return/quit-class instructions never fall through to the lexically
/// next instruction. Used by the routine builder's termination rule and
/// the block partitioner.
pub fn is_terminal(kind: OpcodeKind, number: u8, version: u8) -> bool {
    match kind {
        OpcodeKind::Op0 => matches!(number, 0x00 | 0x01 | 0x03 | 0x07 | 0x08 | 0x0A),
        OpcodeKind::Op1 => matches!(number, 0x0B | 0x0C), // ret, jump
        OpcodeKind::Op2 => number == 0x1C && version >= 5, // throw
        _ => false,
    }
}
