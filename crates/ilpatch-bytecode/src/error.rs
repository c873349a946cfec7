//! Errors raised by instruction stream edits and body images.

use crate::instr::InstrId;
use crate::opcode::{Opcode, OperandKind};

/// A rejected stream edit. The stream is left unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// Branches would point at a removed instruction. `position` is the
    /// removed target for edits, or the offending branch for `verify`.
    #[error("{referrers} branch(es) at position {position} would be left without a target")]
    DanglingBranchTarget { position: usize, referrers: usize },

    /// The handle does not name a live instruction of this stream.
    #[error("instruction {0:?} is not part of this stream")]
    StaleInstruction(InstrId),

    #[error("position {position} is out of range for a stream of {len} instructions")]
    PositionOutOfRange { position: usize, len: usize },

    /// The repair target is itself being removed, or foreign to the stream.
    #[error("cannot repair branches onto {0:?}")]
    InvalidRepairTarget(InstrId),

    #[error("`{opcode}` takes {expected} operand, got {found}")]
    OperandMismatch {
        opcode: Opcode,
        expected: OperandKind,
        found: OperandKind,
    },

    #[error("label `{0}` is never defined")]
    UndefinedLabel(String),

    #[error("label `{0}` is defined twice")]
    DuplicateLabel(String),

    #[error("label `{0}` is not followed by an instruction")]
    TrailingLabel(String),

    /// A committed body refers to a position outside itself.
    #[error("branch at position {position} targets {target}, past the end of the body")]
    TargetOutOfRange { position: usize, target: u32 },

    #[error("body image: {0}")]
    Image(String),
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
