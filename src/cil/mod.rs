//! Read, edit, and write CIL method bodies
//!
//! Method bodies are held as an [`InstructionSequence`]: instructions with stable identities,
//! so branches and exception handlers keep pointing at the right place no matter how much code
//! gets inserted or removed around them. Bytes only show up at the edges:
//!
//! ```text
//!   raw bytes --decode--> InstructionSequence --Writer / splice--> InstructionSequence --encode--> raw bytes
//! ```
//!
//! Metadata (types, methods, fields) lives in a [`MetadataGraph`] and is referred to by `&'g`
//! reference. Tokens are only used at the byte edges, through [`TokenResolver`] and
//! [`TokenAllocator`].

mod blocks;
mod body;
mod decode;
mod encode;
mod errors;
mod instruction;
pub mod metadata;
mod opcodes;
mod splice;
mod stack;
mod writer;
mod writer_exts;

pub use blocks::{branch_distance, SIGNED_8BIT_JUMP_RANGE};
pub use body::*;
pub use decode::decode;
pub use encode::encode;
pub use errors::*;
pub use instruction::*;
pub use metadata::*;
pub use opcodes::*;
pub use splice::{splice, SpliceResult, Transform};
pub use stack::*;
pub use writer::Writer;
pub use writer_exts::WriterExts;
