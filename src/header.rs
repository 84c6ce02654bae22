//! Story-file header. The container format itself is a collaborator
//! concern; the core only needs the handful of offsets and the version
//! that drive decoding and the runtime services.

use crate::fault::Fault;
use std::fmt::{Display, Error, Formatter};

fn word(bytes: &[u8], at: usize) -> u16 {
    ((bytes[at] as u16) << 8) | bytes[at + 1] as u16
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u8,
    pub release: u16,
    pub serial: String,
    pub base_high_mem: u16,
    pub base_static_mem: u16,
    /// First instruction of the entry routine (V1-5: raw byte address of
    /// an instruction; V6+: packed routine address).
    pub initial_pc: u16,
    pub dictionary: u16,
    pub object_table: u16,
    pub global_variables: u16,
    pub abbrev_table: u16,
    pub file_len: usize,
    pub checksum: u16,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Header, Fault> {
        if bytes.len() < 64 {
            return Err(Fault::Decode {
                addr: 0,
                reason: "story file too small for header".to_string(),
            });
        }
        let version = bytes[0];
        match version {
            1..=5 | 7 | 8 => {}
            other => return Err(Fault::UnsupportedVersion(other)),
        }

        // The file-length word is scaled by a version-dependent factor.
        let len_scale = match version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };

        Ok(Header {
            version,
            release: word(bytes, 0x02),
            serial: bytes[0x12..0x18].iter().map(|b| *b as char).collect(),
            base_high_mem: word(bytes, 0x04),
            base_static_mem: word(bytes, 0x0E),
            initial_pc: word(bytes, 0x06),
            dictionary: word(bytes, 0x08),
            object_table: word(bytes, 0x0A),
            global_variables: word(bytes, 0x0C),
            abbrev_table: word(bytes, 0x18),
            file_len: word(bytes, 0x1A) as usize * len_scale,
            checksum: word(bytes, 0x1C),
        })
    }

    /// Multiplier for packed routine/string addresses.
    pub fn packed_scale(&self) -> u32 {
        match self.version {
            1..=3 => 2,
            4..=7 => 4,
            _ => 8,
        }
    }

    pub fn unpack_routine(&self, packed: u16) -> u32 {
        packed as u32 * self.packed_scale()
    }

    pub fn unpack_string(&self, packed: u16) -> u32 {
        packed as u32 * self.packed_scale()
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Serial number:            {}
Start PC:                 {:#06x}
Size of resident memory:  {:#06x}
Size of dynamic memory:   {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.serial,
            self.initial_pc,
            self.base_high_mem,
            self.base_static_mem,
            self.dictionary,
            self.object_table,
            self.global_variables,
            self.abbrev_table,
            self.file_len,
            self.checksum,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_image(version: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes[0] = version;
        bytes[0x06] = 0x00;
        bytes[0x07] = 0x40; // initial PC 0x40
        bytes[0x0E] = 0x00;
        bytes[0x0F] = 0x40; // static memory at 0x40
        bytes
    }

    #[test]
    fn parse_v3() {
        let h = Header::parse(&minimal_image(3)).unwrap();
        assert_eq!(h.version, 3);
        assert_eq!(h.initial_pc, 0x40);
        assert_eq!(h.packed_scale(), 2);
    }

    #[test]
    fn rejects_v6() {
        assert_eq!(
            Header::parse(&minimal_image(6)),
            Err(Fault::UnsupportedVersion(6))
        );
    }

    #[test]
    fn rejects_short_file() {
        assert!(matches!(
            Header::parse(&[3u8; 10]),
            Err(Fault::Decode { .. })
        ));
    }

    #[test]
    fn packed_scales() {
        assert_eq!(Header::parse(&minimal_image(5)).unwrap().packed_scale(), 4);
        assert_eq!(Header::parse(&minimal_image(8)).unwrap().packed_scale(), 8);
    }
}
