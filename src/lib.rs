//! zealous — a Z-machine runtime built around a compiling core.
//!
//! Routines compile on first call into a cached, block-structured
//! threaded form (`jit`); a direct decode-and-dispatch engine (`interp`)
//! provides the validation baseline. Both run against the same runtime
//! services (`machine`) and must be observably identical, opcode for
//! opcode.

#[macro_use]
extern crate lazy_static;

pub mod cfg;
pub mod config;
pub mod dictionary;
pub mod fault;
pub mod header;
pub mod hooks;
pub mod input;
pub mod instruction;
pub mod interp;
pub mod jit;
pub mod machine;
pub mod memory;
pub mod object;
pub mod opcode_tables;
pub mod routine;
pub mod screen;
pub mod screen_headless;
pub mod screen_terminal;
pub mod text;
pub mod zrand;

#[cfg(test)]
pub mod testutil;

/*
Memory map of a typical small story image:

Dynamic  00000  header
         00040  abbreviation strings
         00042  abbreviation table
         00102  property defaults
         00140  objects
         002f0  object descriptions and properties
         006e3  global variables
         008c3  arrays
Static   00b48  grammar table
         01201  adjectives table
         0124d  dictionary
High     01a0a  routines and instruction stream
         05d56  static strings
         06ae6  end of file
*/
