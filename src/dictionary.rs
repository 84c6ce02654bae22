//! Dictionary lookup and tokenization, the collaborator behind `sread`
//! and `tokenise`. The parse buffer receives one 4-byte record per word:
//! dictionary address, length, and position within the text buffer.

use crate::fault::Fault;
use crate::memory::Memory;
use crate::text;
use log::debug;

#[derive(Debug, Clone, Copy)]
pub struct Dictionary {
    base: u16,
    version: u8,
}

impl Dictionary {
    pub fn new(base: u16, version: u8) -> Self {
        Dictionary { base, version }
    }

    fn entry_key_len(&self) -> usize {
        if self.version <= 3 {
            4
        } else {
            6
        }
    }

    fn separators(&self, mem: &Memory) -> Result<Vec<u8>, Fault> {
        let n = mem.read_byte(self.base as u32)?;
        (0..n)
            .map(|i| mem.read_byte(self.base as u32 + 1 + i as u32))
            .collect()
    }

    fn entries(&self, mem: &Memory) -> Result<(u32, usize, usize), Fault> {
        let n_sep = mem.read_byte(self.base as u32)? as u32;
        let at = self.base as u32 + 1 + n_sep;
        let entry_len = mem.read_byte(at)? as usize;
        let count = mem.read_word(at + 1)? as usize;
        Ok((at + 3, entry_len, count))
    }

    /// Address of the dictionary entry matching `word`, or 0.
    pub fn lookup(&self, mem: &Memory, word: &str) -> Result<u16, Fault> {
        let encoded = text::encode_word(word, self.version);
        let (first, entry_len, count) = self.entries(mem)?;
        let key_len = self.entry_key_len();
        for i in 0..count {
            let addr = first + (i * entry_len) as u32;
            let mut matches = true;
            for (j, b) in encoded.iter().enumerate().take(key_len) {
                if mem.read_byte(addr + j as u32)? != *b {
                    matches = false;
                    break;
                }
            }
            if matches {
                return Ok(addr as u16);
            }
        }
        Ok(0)
    }

    /// Split the input line the way the story expects: at spaces, and at
    /// the dictionary's self-delimiting separator characters (which form
    /// words of their own).
    fn split<'a>(&self, line: &'a str, separators: &[u8]) -> Vec<(usize, &'a str)> {
        let bytes = line.as_bytes();
        let mut words = Vec::new();
        let mut start: Option<usize> = None;
        for (i, b) in bytes.iter().enumerate() {
            if *b == b' ' {
                if let Some(s) = start.take() {
                    words.push((s, &line[s..i]));
                }
            } else if separators.contains(b) {
                if let Some(s) = start.take() {
                    words.push((s, &line[s..i]));
                }
                words.push((i, &line[i..i + 1]));
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            words.push((s, &line[s..]));
        }
        words
    }

    /// Tokenize the text buffer into the parse buffer. `text_start` is
    /// the offset of the first character within the text buffer (1 in
    /// V1-4, 2 in V5+).
    pub fn tokenize(
        &self,
        mem: &mut Memory,
        text_buf: u16,
        parse_buf: u16,
        line: &str,
        text_start: u32,
    ) -> Result<(), Fault> {
        let separators = self.separators(mem)?;
        let max_tokens = mem.read_byte(parse_buf as u32)? as usize;
        let words = self.split(line, &separators);

        let mut written = 0u8;
        for (pos, word) in words.iter().take(max_tokens) {
            let entry = self.lookup(mem, word)?;
            let rec = parse_buf as u32 + 2 + written as u32 * 4;
            mem.write_word(rec, entry)?;
            mem.write_byte(rec + 2, word.len() as u8)?;
            mem.write_byte(rec + 3, (*pos as u32 + text_start) as u8)?;
            written += 1;
            debug!("token {:?} -> entry {:#06x}", word, entry);
        }
        mem.write_byte(parse_buf as u32 + 1, written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dictionary with one separator (',') and entries for "look" and
    /// "take", V3 layout.
    fn fixture() -> (Memory, Dictionary) {
        let base = 0x100usize;
        let mut bytes = vec![0u8; 0x200];
        bytes[base] = 1; // one separator
        bytes[base + 1] = b',';
        bytes[base + 2] = 7; // entry length: 4 key bytes + 3 data
        bytes[base + 3] = 0;
        bytes[base + 4] = 2; // two entries

        let e0 = base + 5;
        bytes[e0..e0 + 4].copy_from_slice(&text::encode_word("look", 3));
        let e1 = e0 + 7;
        bytes[e1..e1 + 4].copy_from_slice(&text::encode_word("take", 3));

        let mem = Memory::new(bytes, 0x1FF);
        (mem, Dictionary::new(base as u16, 3))
    }

    #[test]
    fn lookup_finds_known_words() {
        let (mem, dict) = fixture();
        let addr = dict.lookup(&mem, "look").unwrap();
        assert_eq!(addr, 0x105);
        assert_eq!(dict.lookup(&mem, "take").unwrap(), 0x10C);
        assert_eq!(dict.lookup(&mem, "xyzzy").unwrap(), 0);
    }

    #[test]
    fn tokenize_fills_parse_records() {
        let (mut mem, dict) = fixture();
        let parse = 0x80u16;
        mem.write_byte(parse as u32, 4).unwrap(); // room for 4 tokens
        dict.tokenize(&mut mem, 0x40, parse, "take lamp", 1).unwrap();

        assert_eq!(mem.read_byte(parse as u32 + 1).unwrap(), 2);
        // first record: known word
        assert_eq!(mem.read_word(parse as u32 + 2).unwrap(), 0x10C);
        assert_eq!(mem.read_byte(parse as u32 + 4).unwrap(), 4); // len
        assert_eq!(mem.read_byte(parse as u32 + 5).unwrap(), 1); // pos
        // second record: unknown word
        assert_eq!(mem.read_word(parse as u32 + 6).unwrap(), 0);
        assert_eq!(mem.read_byte(parse as u32 + 9).unwrap(), 6); // pos
    }

    #[test]
    fn separators_split_into_their_own_tokens() {
        let (mut mem, dict) = fixture();
        let parse = 0x80u16;
        mem.write_byte(parse as u32, 4).unwrap();
        dict.tokenize(&mut mem, 0x40, parse, "look,take", 1).unwrap();
        assert_eq!(mem.read_byte(parse as u32 + 1).unwrap(), 3);
    }
}
