//! Instructions to raw method body bytes
//!
//! Merged opcode families are written in their shortest encoding, and branch targets are turned
//! back into byte offsets relative to the end of the branch. Short branches are never silently
//! widened: if one can't reach its target any more, encoding fails.

use super::{
    Error, InsnId, Instruction, InstructionSequence, MacroForm, MacroOperand, Operand,
    OperandKind, TokenAllocator, SIGNED_8BIT_JUMP_RANGE, TWO_BYTE_PREFIX,
};
use crate::util::{Offset, Width};
use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Encode instructions, allocating tokens for every metadata reference
pub fn encode<'g>(
    instructions: &InstructionSequence<'g>,
    tokens: &mut impl TokenAllocator<'g>,
) -> Result<Vec<u8>, Error> {
    let offsets: HashMap<InsnId, Offset> = instructions
        .layout()
        .iter()
        .map(|(offset, _, id)| (*id, offset))
        .collect();
    let mut encoder = Encoder {
        offsets,
        tokens,
        output: Vec::with_capacity(instructions.byte_len()),
        _marker: PhantomData,
    };
    for node in instructions {
        encoder.instruction(node.id, &node.instruction)?;
    }
    trace!("encoded {:?} into {} bytes", instructions, encoder.output.len());
    Ok(encoder.output)
}

struct Encoder<'t, 'g, T: TokenAllocator<'g>> {
    /// Where every instruction starts
    offsets: HashMap<InsnId, Offset>,
    tokens: &'t mut T,
    output: Vec<u8>,
    _marker: PhantomData<&'g ()>,
}

impl<'t, 'g, T: TokenAllocator<'g>> Encoder<'t, 'g, T> {
    fn offset_of(&self, id: InsnId) -> Result<Offset, Error> {
        self.offsets
            .get(&id)
            .copied()
            .ok_or(Error::InstructionNotFound(id))
    }

    fn code(&mut self, code: u16) -> Result<(), Error> {
        if code > 0xFF {
            self.output.write_u8(TWO_BYTE_PREFIX)?;
        }
        self.output.write_u8(code as u8)?;
        Ok(())
    }

    fn token(&mut self, token: u32) -> Result<(), Error> {
        self.output.write_u32::<LittleEndian>(token)?;
        Ok(())
    }

    fn instruction(&mut self, id: InsnId, insn: &Instruction<'g>) -> Result<(), Error> {
        let kind = insn.opcode.operand_kind();
        if !insn.operand.fits(kind) {
            return Err(Error::operand_mismatch(insn.opcode, &insn.operand));
        }
        let start = self.offset_of(id)?;
        let end = Offset(start.0 + insn.width());

        if let Some((form, value)) = insn
            .macro_value()
            .and_then(|value| MacroForm::shortest(insn.opcode, value).map(|form| (form, value)))
        {
            self.code(form.code)?;
            match form.operand {
                MacroOperand::Implied(_) => (),
                MacroOperand::U8 => self.output.write_u8(value as u8)?,
                MacroOperand::I8 => self.output.write_i8(value as i8)?,
                MacroOperand::U16 => self.output.write_u16::<LittleEndian>(value as u16)?,
                MacroOperand::I32 => self.output.write_i32::<LittleEndian>(value as i32)?,
            }
            return Ok(());
        }

        self.code(insn.opcode.code())?;
        match &insn.operand {
            Operand::None => (),
            Operand::Branch(None) => return Err(Error::UnresolvedBranch(id)),
            Operand::Branch(Some(target)) => {
                let distance = self.offset_of(*target)? - end;
                if kind == OperandKind::ShortInlineBrTarget {
                    if !SIGNED_8BIT_JUMP_RANGE.contains(&distance) {
                        return Err(Error::BranchOutOfRange {
                            branch: id,
                            distance,
                        });
                    }
                    self.output.write_i8(distance as i8)?;
                } else {
                    self.output.write_i32::<LittleEndian>(distance as i32)?;
                }
            }
            Operand::Switch(targets) => {
                self.output.write_u32::<LittleEndian>(targets.len() as u32)?;
                for target in targets {
                    let distance = self.offset_of(*target)? - end;
                    self.output.write_i32::<LittleEndian>(distance as i32)?;
                }
            }
            Operand::Int8(value) => self.output.write_i8(*value)?,
            Operand::Int32(value) => self.output.write_i32::<LittleEndian>(*value)?,
            Operand::Int64(value) => self.output.write_i64::<LittleEndian>(*value)?,
            Operand::Float32(value) => self.output.write_f32::<LittleEndian>(*value)?,
            Operand::Float64(value) => self.output.write_f64::<LittleEndian>(*value)?,
            Operand::Local(idx) | Operand::Argument(idx) => {
                self.output.write_u16::<LittleEndian>(*idx)?
            }
            Operand::String(string) => {
                let token = self.tokens.string_token(string);
                self.token(token.0)?
            }
            Operand::Type(ty) => {
                let token = self.tokens.type_token(*ty);
                self.token(token.0)?
            }
            Operand::Method(method) => {
                let token = self.tokens.method_token(*method);
                self.token(token.0)?
            }
            Operand::Field(field) => {
                let token = self.tokens.field_token(*field);
                self.token(token.0)?
            }
            Operand::Token(member) => {
                let token = self.tokens.member_token(*member);
                self.token(token.0)?
            }
            Operand::CallSite(call_site) => {
                let token = self.tokens.call_site_token(*call_site);
                self.token(token.0)?
            }
        }
        Ok(())
    }
}
