use super::{InsnId, Opcode, Operand};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Cursor or index addressing outside of the sequence
    OutOfRange { index: usize, len: usize },

    /// Instruction is not (or no longer) in the sequence
    InstructionNotFound(InsnId),

    /// `end()` with no open block, or a body finished with blocks still open
    UnbalancedStructure { open_blocks: usize },

    /// Operation needs state that isn't there (eg. restoring with nothing saved)
    InvalidState(&'static str),

    /// Splice could not find a slot in the target for a donor local or argument
    ShapeMismatch(String),

    /// Metadata token could not be resolved (or allocated)
    UnresolvableToken(u32),

    /// Branch offset does not land on an instruction boundary
    InvalidBranchOffset { from: usize, target: isize },

    /// Opcode byte (or `0xFE`-prefixed pair) that isn't part of the instruction set
    UnknownOpcode { code: u16, offset: usize },

    /// Bytes ran out in the middle of an instruction
    UnexpectedEnd { offset: usize },

    /// Repositioning walked off the sequence before reaching the requested depth
    StackExhausted { requested: i32, reached: i32 },

    /// Stack effect depends on an operand that isn't a resolved method or call site
    UnknownStackEffect(Opcode),

    /// Removing the instruction would leave a branch or handler pointing nowhere
    DanglingReference(InsnId),

    /// Branch whose target was never filled in
    UnresolvedBranch(InsnId),

    /// Short branch can't reach its target
    BranchOutOfRange { branch: InsnId, distance: isize },

    /// Operand doesn't have the shape the opcode expects
    OperandMismatch { opcode: Opcode, operand: String },

    IoError(std::io::Error),
}

impl Error {
    pub(crate) fn operand_mismatch(opcode: Opcode, operand: &Operand<'_>) -> Error {
        Error::OperandMismatch {
            opcode,
            operand: format!("{:?}", operand),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfRange { index, len } => {
                write!(f, "index {} is out of range for {} instructions", index, len)
            }
            Error::InstructionNotFound(id) => write!(f, "instruction {:?} is not in the body", id),
            Error::UnbalancedStructure { open_blocks } => {
                write!(f, "unbalanced structure ({} open blocks)", open_blocks)
            }
            Error::InvalidState(what) => write!(f, "invalid state: {}", what),
            Error::ShapeMismatch(what) => write!(f, "shape mismatch: {}", what),
            Error::UnresolvableToken(token) => write!(f, "unresolvable token 0x{:08x}", token),
            Error::InvalidBranchOffset { from, target } => write!(
                f,
                "branch at IL_{:04x} targets {} which is not an instruction boundary",
                from, target
            ),
            Error::UnknownOpcode { code, offset } => {
                write!(f, "unknown opcode 0x{:x} at IL_{:04x}", code, offset)
            }
            Error::UnexpectedEnd { offset } => {
                write!(f, "unexpected end of bytecode at IL_{:04x}", offset)
            }
            Error::StackExhausted { requested, reached } => write!(
                f,
                "ran out of instructions looking for stack depth {} (reached {})",
                requested, reached
            ),
            Error::UnknownStackEffect(opcode) => {
                write!(f, "stack effect of `{}` cannot be determined", opcode)
            }
            Error::DanglingReference(id) => {
                write!(f, "{:?} is still referenced and has no successor", id)
            }
            Error::UnresolvedBranch(id) => write!(f, "branch {:?} has no target", id),
            Error::BranchOutOfRange { branch, distance } => write!(
                f,
                "short branch {:?} cannot jump {} bytes",
                branch, distance
            ),
            Error::OperandMismatch { opcode, operand } => {
                write!(f, "`{}` cannot take operand {}", opcode, operand)
            }
            Error::IoError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
