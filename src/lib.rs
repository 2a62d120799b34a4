//! Compile-time weaving of CIL method bodies
//!
//! The interesting part of this crate is [`cil::Writer`]: a cursor over a method body's
//! instruction sequence that survives insertions and deletions, tracks nested `if`/`unless`
//! blocks until they can be resolved into real branches, and can reposition itself using the
//! evaluation stack depth. Around it sit the pieces needed to feed it:
//!
//!   - [`cil::decode`] turns raw method bytes back into instructions
//!   - [`cil::splice`] transplants one body into another, remapping locals and arguments
//!   - [`cil::encode`] writes instructions back out to bytes
//!   - [`weave`] drives markers over program elements, one member at a time
//!
//! ### Example
//!
//! ```
//! use cilweave::cil::*;
//!
//! # fn build() -> Result<(), Error> {
//! let arenas = MetadataArenas::new();
//! let graph = MetadataGraph::new(&arenas);
//! let core = graph.insert_core_types();
//!
//! let program = graph.add_type(TypeData::new("Demo", "Program", false));
//! let method = graph.add_method(MethodData::new(
//!     program,
//!     "Answer",
//!     MethodSignature::new(false, vec![], Some(core.int32)),
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//! ));
//!
//! let mut body = MethodBody::new(method);
//! let mut writer = Writer::new(&mut body);
//! writer
//!     .load_int(1)?
//!     .begin_if()?
//!     .load_int(42)?
//!     .emit(Opcode::Pop)?
//!     .end()?
//!     .load_int(0)?
//!     .emit(Opcode::Ret)?;
//! writer.finish()?;
//!
//! let mut tokens = TokenTable::new();
//! let bytes = encode(&body.instructions, &mut tokens)?;
//! let decoded = decode(&bytes, &tokens)?;
//! assert!(decoded.structurally_eq(&body.instructions));
//! # Ok(())
//! # }
//! # build().unwrap();
//! ```

pub mod cil;
pub mod util;
pub mod weave;
