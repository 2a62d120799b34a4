//! Raw method body bytes to instructions
//!
//! Decoding takes two passes. The first reads every instruction, normalizing the merged opcode
//! families (`ldloc.1`, `ldc.i4.s`, ...) and resolving metadata tokens, while noting the byte
//! offset each instruction started at. Branch targets are relative byte offsets, and forward ones
//! can't be resolved before the instruction they land on has been read, so they are only turned
//! into instruction identities in the second pass.

use super::{
    Error, InsnId, Instruction, InstructionSequence, MacroForm, MacroOperand, Opcode, Operand,
    OperandKind, Token, TokenResolver, TWO_BYTE_PREFIX,
};
use crate::util::{Offset, OffsetTable};
use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;
use std::io::{self, Cursor};

/// Branch whose targets are still relative byte offsets
struct PendingBranch {
    /// Position of the branch in the sequence
    index: usize,

    /// Offset of the branch itself
    from: usize,

    /// Absolute target offsets
    targets: Vec<isize>,
}

/// Decode the instructions of a method body
///
/// Every node of the returned sequence has its offset cache filled in with the offset the
/// instruction was decoded from.
pub fn decode<'g>(
    bytes: &[u8],
    tokens: &impl TokenResolver<'g>,
) -> Result<InstructionSequence<'g>, Error> {
    let mut reader = Cursor::new(bytes);
    let mut instructions = InstructionSequence::new();
    let mut offsets: OffsetTable<InsnId> = OffsetTable::new();
    let mut pending: Vec<PendingBranch> = vec![];

    while (reader.position() as usize) < bytes.len() {
        let start = reader.position() as usize;
        let (instruction, relative_targets) = read_instruction(&mut reader, start, tokens)?;
        let end = reader.position() as isize;

        let index = instructions.len();
        let id = instructions.push(instruction);
        if let Some(node) = instructions.get_mut(index) {
            node.offset = Some(Offset(start));
        }
        offsets.insert_at(Offset(start), id);

        if let Some(relative) = relative_targets {
            pending.push(PendingBranch {
                index,
                from: start,
                targets: relative.into_iter().map(|rel| end + rel).collect(),
            });
        }
    }

    for branch in pending {
        let mut resolved = Vec::with_capacity(branch.targets.len());
        for target in branch.targets {
            let found = if target < 0 {
                None
            } else {
                offsets.get_offset(Offset(target as usize)).ok().copied()
            };
            resolved.push(found.ok_or(Error::InvalidBranchOffset {
                from: branch.from,
                target,
            })?);
        }
        if let Some(node) = instructions.get_mut(branch.index) {
            match &mut node.instruction.operand {
                Operand::Branch(slot) => *slot = resolved.first().copied(),
                Operand::Switch(slots) => *slots = resolved,
                _ => (),
            }
        }
    }

    trace!("decoded {} bytes into {:?}", bytes.len(), instructions);
    Ok(instructions)
}

/// Map running out of bytes onto an error pointing at the instruction being read
fn truncated<T>(result: io::Result<T>, start: usize) -> Result<T, Error> {
    result.map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Error::UnexpectedEnd { offset: start },
        _ => Error::IoError(err),
    })
}

/// Read one instruction, along with its relative branch offsets if it is a branch or switch
fn read_instruction<'g>(
    reader: &mut Cursor<&[u8]>,
    start: usize,
    tokens: &impl TokenResolver<'g>,
) -> Result<(Instruction<'g>, Option<Vec<isize>>), Error> {
    let first = truncated(reader.read_u8(), start)?;
    let code = if first == TWO_BYTE_PREFIX {
        0xFE00 | truncated(reader.read_u8(), start)? as u16
    } else {
        first as u16
    };

    if let Some((opcode, form)) = MacroForm::decode(code) {
        let value: i32 = match form {
            MacroOperand::Implied(value) => value,
            MacroOperand::U8 => truncated(reader.read_u8(), start)? as i32,
            MacroOperand::I8 => truncated(reader.read_i8(), start)? as i32,
            MacroOperand::U16 => truncated(reader.read_u16::<LittleEndian>(), start)? as i32,
            MacroOperand::I32 => truncated(reader.read_i32::<LittleEndian>(), start)?,
        };
        let operand = match opcode {
            Opcode::LdcI4 => Operand::Int32(value),
            Opcode::Ldarg | Opcode::Ldarga | Opcode::Starg => Operand::Argument(value as u16),
            _ => Operand::Local(value as u16),
        };
        return Ok((Instruction { opcode, operand }, None));
    }

    let opcode = Opcode::from_code(code).ok_or(Error::UnknownOpcode {
        code,
        offset: start,
    })?;
    let token = |reader: &mut Cursor<&[u8]>| -> Result<Token, Error> {
        Ok(Token(truncated(reader.read_u32::<LittleEndian>(), start)?))
    };
    let unresolvable = |token: Token| Error::UnresolvableToken(token.0);

    let mut targets = None;
    let operand = match opcode.operand_kind() {
        OperandKind::InlineNone => Operand::None,
        OperandKind::ShortInlineBrTarget => {
            targets = Some(vec![truncated(reader.read_i8(), start)? as isize]);
            Operand::Branch(None)
        }
        OperandKind::InlineBrTarget => {
            targets = Some(vec![
                truncated(reader.read_i32::<LittleEndian>(), start)? as isize,
            ]);
            Operand::Branch(None)
        }
        OperandKind::InlineSwitch => {
            let count = truncated(reader.read_u32::<LittleEndian>(), start)?;
            let mut relative = vec![];
            for _ in 0..count {
                relative.push(truncated(reader.read_i32::<LittleEndian>(), start)? as isize);
            }
            targets = Some(relative);
            Operand::Switch(vec![])
        }
        OperandKind::ShortInlineI => Operand::Int8(truncated(reader.read_i8(), start)?),
        OperandKind::InlineI => {
            Operand::Int32(truncated(reader.read_i32::<LittleEndian>(), start)?)
        }
        OperandKind::InlineI8 => {
            Operand::Int64(truncated(reader.read_i64::<LittleEndian>(), start)?)
        }
        OperandKind::ShortInlineR => {
            Operand::Float32(truncated(reader.read_f32::<LittleEndian>(), start)?)
        }
        OperandKind::InlineR => {
            Operand::Float64(truncated(reader.read_f64::<LittleEndian>(), start)?)
        }
        OperandKind::InlineVar => {
            Operand::Local(truncated(reader.read_u16::<LittleEndian>(), start)?)
        }
        OperandKind::InlineArg => {
            Operand::Argument(truncated(reader.read_u16::<LittleEndian>(), start)?)
        }
        OperandKind::InlineString => {
            let token = token(reader)?;
            Operand::String(tokens.resolve_string(token).ok_or_else(|| unresolvable(token))?)
        }
        OperandKind::InlineType => {
            let token = token(reader)?;
            Operand::Type(tokens.resolve_type(token).ok_or_else(|| unresolvable(token))?)
        }
        OperandKind::InlineMethod => {
            let token = token(reader)?;
            Operand::Method(tokens.resolve_method(token).ok_or_else(|| unresolvable(token))?)
        }
        OperandKind::InlineField => {
            let token = token(reader)?;
            Operand::Field(tokens.resolve_field(token).ok_or_else(|| unresolvable(token))?)
        }
        OperandKind::InlineTok => {
            let token = token(reader)?;
            Operand::Token(tokens.resolve_member(token).ok_or_else(|| unresolvable(token))?)
        }
        OperandKind::InlineSig => {
            let token = token(reader)?;
            Operand::CallSite(
                tokens
                    .resolve_call_site(token)
                    .ok_or_else(|| unresolvable(token))?,
            )
        }
    };
    Ok((Instruction { opcode, operand }, targets))
}

#[cfg(test)]
mod test {
    use super::super::*;
    use super::*;

    #[test]
    fn macro_forms_are_normalized() {
        let tokens = TokenTable::new();
        // ldarg.1, ldloc.s 4, ldc.i4.m1, ldc.i4.s -5, ldc.i4 1000, stloc.0, ldarg 2 (wide)
        let bytes = [
            0x03, 0x11, 0x04, 0x15, 0x1F, 0xFB, 0x20, 0xE8, 0x03, 0x00, 0x00, 0x0A, 0xFE, 0x09,
            0x02, 0x00,
        ];
        let seq = decode(&bytes, &tokens).unwrap();
        let decoded: Vec<(Opcode, Operand<'_>)> = seq
            .iter()
            .map(|node| (node.instruction.opcode, node.instruction.operand.clone()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (Opcode::Ldarg, Operand::Argument(1)),
                (Opcode::Ldloc, Operand::Local(4)),
                (Opcode::LdcI4, Operand::Int32(-1)),
                (Opcode::LdcI4, Operand::Int32(-5)),
                (Opcode::LdcI4, Operand::Int32(1000)),
                (Opcode::Stloc, Operand::Local(0)),
                (Opcode::Ldarg, Operand::Argument(2)),
            ]
        );
        let offsets: Vec<usize> = seq.iter().map(|node| node.offset.unwrap().0).collect();
        assert_eq!(offsets, vec![0, 1, 3, 4, 6, 11, 12]);
    }

    #[test]
    fn branches_resolve_both_ways() {
        let tokens = TokenTable::new();
        // 0: nop; 1: br.s +1 (-> 4); 3: nop; 4: br -8 (-> 1)
        let bytes = [0x00, 0x2B, 0x01, 0x00, 0x38, 0xF8, 0xFF, 0xFF, 0xFF];
        let seq = decode(&bytes, &tokens).unwrap();
        let forward = &seq.get(1).unwrap().instruction;
        let backward = &seq.get(3).unwrap().instruction;
        assert_eq!(forward.opcode, Opcode::BrS);
        assert_eq!(forward.targets(), vec![seq.id_at(3).unwrap()]);
        assert_eq!(backward.opcode, Opcode::Br);
        assert_eq!(backward.targets(), vec![seq.id_at(1).unwrap()]);
    }

    #[test]
    fn switch_targets_are_relative_to_the_end() {
        let tokens = TokenTable::new();
        // 0: switch (2 targets: +0, +1) [13 bytes]; 13: nop; 14: ret
        let bytes = [
            0x45, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
            0x2A,
        ];
        let seq = decode(&bytes, &tokens).unwrap();
        assert_eq!(
            seq.get(0).unwrap().instruction.targets(),
            vec![seq.id_at(1).unwrap(), seq.id_at(2).unwrap()]
        );
    }

    #[test]
    fn malformed_input() {
        let tokens = TokenTable::new();
        assert!(matches!(
            decode(&[0x00, 0x24], &tokens),
            Err(Error::UnknownOpcode { code: 0x24, offset: 1 })
        ));
        assert!(matches!(
            decode(&[0xFE, 0xFF], &tokens),
            Err(Error::UnknownOpcode { code: 0xFEFF, offset: 0 })
        ));
        assert!(matches!(
            decode(&[0x00, 0x20, 0x01, 0x00], &tokens),
            Err(Error::UnexpectedEnd { offset: 1 })
        ));
        assert!(matches!(
            decode(&[0xFE], &tokens),
            Err(Error::UnexpectedEnd { offset: 0 })
        ));
        // br.s into the middle of ldc.i4
        assert!(matches!(
            decode(&[0x2B, 0x01, 0x20, 0x00, 0x00, 0x00, 0x00], &tokens),
            Err(Error::InvalidBranchOffset { from: 0, target: 3 })
        ));
        // br.s before the start
        assert!(matches!(
            decode(&[0x2B, 0xF0], &tokens),
            Err(Error::InvalidBranchOffset { target: -14, .. })
        ));
        // ldstr with a token nobody handed out
        assert!(matches!(
            decode(&[0x72, 0x01, 0x00, 0x00, 0x70], &tokens),
            Err(Error::UnresolvableToken(0x7000_0001))
        ));
    }

    #[test]
    fn tokens_resolve_through_the_table() {
        let arenas = MetadataArenas::new();
        let graph = MetadataGraph::new(&arenas);
        let core = graph.insert_core_types();
        let mut tokens = TokenTable::new();
        let ctor = tokens.method_token(core.object_ctor);
        let hello = tokens.string_token("hello");

        let mut bytes = vec![0x72];
        bytes.extend_from_slice(&hello.0.to_le_bytes());
        bytes.push(0x73);
        bytes.extend_from_slice(&ctor.0.to_le_bytes());
        let seq = decode(&bytes, &tokens).unwrap();

        assert_eq!(
            seq.get(0).unwrap().instruction.operand,
            Operand::String(String::from("hello"))
        );
        assert_eq!(
            seq.get(1).unwrap().instruction.operand,
            Operand::Method(core.object_ctor)
        );
    }
}
