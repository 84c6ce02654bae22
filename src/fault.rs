//! Fault taxonomy and the control-signal channel.
//!
//! Everything that can stop a run travels the same channel (`Trap`), but
//! faults and clean terminations stay structurally distinct so the top
//! level never mistakes `quit` for an error.

use crate::instruction::OpcodeKind;
use std::fmt;
use thiserror::Error;

/// A fault terminates the current run; none are recoverable mid-instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("Stack is full")]
    StackFull,

    #[error("Stack is empty")]
    StackEmpty,

    #[error("invalid object {0}")]
    InvalidObject(u16),

    #[error("object {object} has no property {property}")]
    PropertyNotFound { object: u16, property: u16 },

    #[error("attribute {0} out of range")]
    InvalidAttribute(u16),

    #[error("unknown opcode {kind}:{number:#04x} in version {version}")]
    UnknownOpcode {
        kind: OpcodeKind,
        number: u8,
        version: u8,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("write to non-dynamic memory at {0:#06x}")]
    ReadOnlyWrite(u32),

    #[error("memory read out of bounds at {0:#06x}")]
    ReadOutOfBounds(u32),

    #[error("memory write out of bounds at {0:#06x}")]
    WriteOutOfBounds(u32),

    #[error("decode error at {addr:#06x}: {reason}")]
    Decode { addr: u32, reason: String },

    #[error("local variable L{0:02x} not declared by this routine")]
    LocalOutOfRange(u8),

    #[error("global index {0} out of range")]
    GlobalOutOfRange(u16),

    #[error("no routine frame for local variable access")]
    NoActiveFrame,

    #[error("call depth limit {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("throw without a matching catch frame")]
    UnmatchedThrow,

    #[error("unsupported story version {0}")]
    UnsupportedVersion(u8),

    #[error("output stream 3 nested too deep")]
    StreamOverflow,

    #[error("{0}")]
    Screen(String),
}

/// What travels up the native call stack. `Fault` means trouble; the rest
/// are distinguished signals that unwind cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    Fault(Fault),
    /// The story executed `quit`.
    Quit,
    /// An external caller (scripted input, stop token) ended the run early.
    Interrupted,
    /// The story executed `restart`; the run loop resets and re-enters.
    Restart,
    /// In-flight `throw`: unwinds until the frame at `depth`, which then
    /// returns `value`.
    Unwind { depth: usize, value: u16 },
}

impl From<Fault> for Trap {
    fn from(f: Fault) -> Self {
        Trap::Fault(f)
    }
}

/// How a run ended when it did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `quit` executed.
    Quit,
    /// Stop token or input source ended the run.
    Interrupted,
    /// The entry routine ran off its end and returned.
    MainReturned,
}

/// Fault plus the address of the last instruction that executed, reported
/// by the top-level run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    pub fault: Fault,
    pub addr: u32,
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault at {:#06x}: {}", self.addr, self.fault)
    }
}

impl std::error::Error for FaultReport {}
