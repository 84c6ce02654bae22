//! ZSCII text collaborator: decodes packed-word character streams and
//! encodes dictionary words. The core attaches packed text to
//! instructions raw; this module is the one place that unpacks it.

use crate::fault::Fault;
use crate::memory::Memory;
use bitreader::BitReader;
use std::collections::HashMap;

#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub enum Alphabet {
    A0,
    A1,
    A2,
}

lazy_static! {
    static ref ALPHABETS: HashMap<Alphabet, &'static str> = {
        let mut m = HashMap::new();
        m.insert(Alphabet::A0, "abcdefghijklmnopqrstuvwxyz");
        m.insert(Alphabet::A1, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        // Positions 0 and 1 stand in for the escape and newline z-chars,
        // which are handled before alphabet lookup.
        m.insert(Alphabet::A2, " ^0123456789.,!?_#'\"/\\-:()");
        m
    };
}

/// Three 5-bit z-chars unpacked from one 16-bit word; `last` is the
/// stream terminator bit.
#[derive(Debug, Clone, Copy)]
struct PackedChars {
    last: bool,
    chars: [u8; 3],
}

fn unpack_word(word: u16) -> PackedChars {
    let bytes = word.to_be_bytes();
    let mut br = BitReader::new(&bytes);
    // The reads cannot fail: two bytes hold exactly 1 + 3*5 bits.
    let last = br.read_u8(1).unwrap() == 1;
    let mut chars = [0u8; 3];
    for c in chars.iter_mut() {
        *c = br.read_u8(5).unwrap();
    }
    PackedChars { last, chars }
}

/// Collect the packed words of a string starting at `addr`, up to and
/// including the word with the terminator bit set.
pub fn collect_words(mem: &Memory, addr: u32) -> Result<Vec<u16>, Fault> {
    let mut words = Vec::new();
    let mut at = addr;
    loop {
        let w = mem.read_word(at)?;
        words.push(w);
        at += 2;
        if w & 0x8000 != 0 {
            return Ok(words);
        }
    }
}

/// Decode the string at `addr`. Returns the text and its byte length.
pub fn decode(mem: &Memory, addr: u32, abbrev_table: u16) -> Result<(String, usize), Fault> {
    let words = collect_words(mem, addr)?;
    let text = decode_words(&words, mem, abbrev_table, 0)?;
    Ok((text, words.len() * 2))
}

/// Decode an already-collected packed-word stream (e.g. an instruction's
/// embedded text payload).
pub fn decode_payload(words: &[u16], mem: &Memory, abbrev_table: u16) -> Result<String, Fault> {
    decode_words(words, mem, abbrev_table, 0)
}

fn decode_words(
    words: &[u16],
    mem: &Memory,
    abbrev_table: u16,
    depth: u8,
) -> Result<String, Fault> {
    let mut out = String::new();
    let mut alphabet = Alphabet::A0;
    let mut pending_abbrev: Option<u8> = None;
    let mut pending_wide: Option<(bool, u8)> = None; // (seen_first, high bits)

    for pw in words.iter().map(|w| unpack_word(*w)) {
        for c in pw.chars {
            if let Some((seen, high)) = pending_wide {
                if !seen {
                    pending_wide = Some((true, c));
                } else {
                    let code = ((high as u16) << 5) | c as u16;
                    push_zscii(&mut out, code);
                    pending_wide = None;
                }
                continue;
            }
            if let Some(table) = pending_abbrev {
                out.push_str(&expand_abbrev(mem, abbrev_table, table, c, depth)?);
                pending_abbrev = None;
                alphabet = Alphabet::A0;
                continue;
            }
            match c {
                0 => out.push(' '),
                1..=3 => pending_abbrev = Some(c),
                4 => alphabet = Alphabet::A1,
                5 => alphabet = Alphabet::A2,
                6 if alphabet == Alphabet::A2 => {
                    pending_wide = Some((false, 0));
                    alphabet = Alphabet::A0;
                }
                7 if alphabet == Alphabet::A2 => {
                    out.push('\n');
                    alphabet = Alphabet::A0;
                }
                6..=31 => {
                    out.push(ALPHABETS[&alphabet].as_bytes()[(c - 6) as usize] as char);
                    alphabet = Alphabet::A0;
                }
                _ => unreachable!("z-chars are 5 bits"),
            }
        }
        if pw.last {
            break;
        }
    }
    Ok(out)
}

fn expand_abbrev(
    mem: &Memory,
    abbrev_table: u16,
    table: u8,
    index: u8,
    depth: u8,
) -> Result<String, Fault> {
    if depth > 0 {
        // Abbreviations must not nest; tolerate malformed data quietly.
        return Ok(String::new());
    }
    let entry = abbrev_table as u32 + 2 * (32 * (table as u32 - 1) + index as u32);
    let string_addr = mem.read_word(entry)? as u32 * 2;
    let words = collect_words(mem, string_addr)?;
    decode_words(&words, mem, abbrev_table, depth + 1)
}

fn push_zscii(out: &mut String, code: u16) {
    match code {
        0 => {}
        13 => out.push('\n'),
        32..=126 => out.push(code as u8 as char),
        _ => out.push('?'),
    }
}

/// Map one output ZSCII code to a character, for `print_char`.
pub fn zscii_to_char(code: u16) -> Option<char> {
    match code {
        13 => Some('\n'),
        32..=126 => Some(code as u8 as char),
        _ => None,
    }
}

/// Encode a dictionary word into its packed z-char form: 2 words (6
/// z-chars) in V1-3, 3 words (9 z-chars) in V4+. Truncates long words and
/// pads short ones with shift-5, exactly as story compilers do.
pub fn encode_word(word: &str, version: u8) -> Vec<u8> {
    let z_len = if version <= 3 { 6 } else { 9 };
    let mut zchars: Vec<u8> = Vec::with_capacity(z_len);

    for ch in word.chars().flat_map(|c| c.to_lowercase()) {
        if zchars.len() >= z_len {
            break;
        }
        if let Some(pos) = ALPHABETS[&Alphabet::A0].find(ch) {
            zchars.push(pos as u8 + 6);
        } else if let Some(pos) = ALPHABETS[&Alphabet::A2][2..].find(ch) {
            zchars.push(5);
            zchars.push(pos as u8 + 8);
        } else {
            // 10-bit literal escape
            let code = ch as u32;
            zchars.push(5);
            zchars.push(6);
            zchars.push(((code >> 5) & 0x1F) as u8);
            zchars.push((code & 0x1F) as u8);
        }
    }
    zchars.truncate(z_len);
    while zchars.len() < z_len {
        zchars.push(5);
    }

    let mut bytes = Vec::with_capacity(z_len / 3 * 2);
    for (i, triple) in zchars.chunks(3).enumerate() {
        let mut w = ((triple[0] as u16) << 10) | ((triple[1] as u16) << 5) | triple[2] as u16;
        if i == z_len / 3 - 1 {
            w |= 0x8000;
        }
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    bytes
}

/// Pack a plain ASCII string into z-words, for building test fixtures and
/// synthetic stories.
pub fn encode_string(text: &str) -> Vec<u16> {
    let mut zchars: Vec<u8> = Vec::new();
    for ch in text.chars() {
        if ch == ' ' {
            zchars.push(0);
        } else if ch == '\n' {
            zchars.push(5);
            zchars.push(7);
        } else if let Some(pos) = ALPHABETS[&Alphabet::A0].find(ch) {
            zchars.push(pos as u8 + 6);
        } else if let Some(pos) = ALPHABETS[&Alphabet::A1].find(ch) {
            zchars.push(4);
            zchars.push(pos as u8 + 6);
        } else if let Some(pos) = ALPHABETS[&Alphabet::A2][2..].find(ch) {
            zchars.push(5);
            zchars.push(pos as u8 + 8);
        } else {
            let code = ch as u32;
            zchars.push(5);
            zchars.push(6);
            zchars.push(((code >> 5) & 0x1F) as u8);
            zchars.push((code & 0x1F) as u8);
        }
    }
    while zchars.len() % 3 != 0 {
        zchars.push(5);
    }
    if zchars.is_empty() {
        zchars.extend_from_slice(&[5, 5, 5]);
    }
    let n_words = zchars.len() / 3;
    let mut words = Vec::with_capacity(n_words);
    for (i, triple) in zchars.chunks(3).enumerate() {
        let mut w = ((triple[0] as u16) << 10) | ((triple[1] as u16) << 5) | triple[2] as u16;
        if i == n_words - 1 {
            w |= 0x8000;
        }
        words.push(w);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_words(words: &[u16]) -> Memory {
        let mut bytes = vec![0u8; 0x40];
        for w in words {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        Memory::new(bytes, 0x40)
    }

    #[test]
    fn round_trips_lowercase() {
        let words = encode_string("hello world");
        let mem = memory_with_words(&words);
        let (text, len) = decode(&mem, 0x40, 0).unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(len, words.len() * 2);
    }

    #[test]
    fn round_trips_mixed_case_and_punctuation() {
        let words = encode_string("West of House.");
        let mem = memory_with_words(&words);
        let (text, _) = decode(&mem, 0x40, 0).unwrap();
        assert_eq!(text, "West of House.");
    }

    #[test]
    fn newline_escape() {
        let words = encode_string("a\nb");
        let mem = memory_with_words(&words);
        let (text, _) = decode(&mem, 0x40, 0).unwrap();
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn terminator_bit_ends_collection() {
        let mem = memory_with_words(&[0x1234, 0x9234, 0x1234]);
        let words = collect_words(&mem, 0x40).unwrap();
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn encode_word_v3_is_four_bytes() {
        let bytes = encode_word("mailbox", 3);
        assert_eq!(bytes.len(), 4);
        assert!(bytes[2] & 0x80 != 0);
    }

    #[test]
    fn encode_word_v5_is_six_bytes() {
        let bytes = encode_word("mailbox", 5);
        assert_eq!(bytes.len(), 6);
        assert!(bytes[4] & 0x80 != 0);
    }

    #[test]
    fn short_words_pad_identically() {
        assert_eq!(encode_word("go", 3), encode_word("go", 3));
        assert_ne!(encode_word("go", 3), encode_word("gone", 3));
    }
}
