//! Structured `if`/`unless` blocks
//!
//! Opening a block reserves a slot (a `nop` placeholder) for the conditional branch that will
//! skip the block. Closing it drops a `nop` landing pad at the cursor and turns the placeholder
//! into a branch to that landing pad. Blocks nest, and only the innermost can be closed.
//!
//! Which branch form gets used is decided when the block is closed, from the byte distance the
//! branch has to cover at that time. Edits made inside the block after it is closed can push a
//! short branch out of range; the encoder reports that rather than silently widening.

use super::{Error, InsnId, Instruction, InstructionSequence, Opcode, Operand, Writer};
use crate::util::Width;
use log::trace;
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by short-form branches
pub const SIGNED_8BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i8::MIN as isize, i8::MAX as isize);

/// Open structured block
#[derive(Copy, Clone, Debug)]
pub(crate) struct Block {
    /// Slot for the branch skipping the block
    pub placeholder: InsnId,

    /// `unless` blocks are skipped when the condition holds, `if` blocks when it doesn't
    pub inverted: bool,
}

/// Offset a branch at `branch` needs to jump to `target`, measured from the end of the branch
///
/// `branch_width` is the width the branch will have once materialized.
pub fn branch_distance(
    instructions: &InstructionSequence<'_>,
    branch: usize,
    target: usize,
    branch_width: usize,
) -> isize {
    let width_of = |range: std::ops::Range<usize>| -> isize {
        instructions
            .iter()
            .skip(range.start)
            .take(range.end.saturating_sub(range.start))
            .map(|node| node.instruction.width() as isize)
            .sum()
    };
    if target > branch {
        width_of(branch + 1..target)
    } else {
        -(width_of(target..branch) + branch_width as isize)
    }
}

impl<'b, 'g> Writer<'b, 'g> {
    /// Open a block that runs only if the value on top of the stack is true (non-zero)
    pub fn begin_if(&mut self) -> Result<&mut Self, Error> {
        self.begin_block(false)
    }

    /// Open a block that runs only if the value on top of the stack is false (zero)
    pub fn begin_unless(&mut self) -> Result<&mut Self, Error> {
        self.begin_block(true)
    }

    fn begin_block(&mut self, inverted: bool) -> Result<&mut Self, Error> {
        self.emit_instruction(Instruction::nop())?;
        let placeholder = self.body.instructions.id_at(self.position - 1).ok_or(
            Error::InvalidState("placeholder vanished right after being emitted"),
        )?;
        trace!(
            "open {} block {:?} at {}",
            if inverted { "unless" } else { "if" },
            placeholder,
            self.position - 1
        );
        self.body.blocks.push(Block {
            placeholder,
            inverted,
        });
        Ok(self)
    }

    /// Close the innermost open block at the cursor
    ///
    /// Fails without touching the body if there is no open block.
    pub fn end(&mut self) -> Result<&mut Self, Error> {
        let block = match self.body.blocks.last() {
            Some(block) => *block,
            None => return Err(Error::UnbalancedStructure { open_blocks: 0 }),
        };
        if !self.body.instructions.contains(block.placeholder) {
            return Err(Error::InstructionNotFound(block.placeholder));
        }

        // Landing pad, so whatever gets emitted next is still inside the fall-through path
        self.emit_instruction(Instruction::nop())?;
        let landing_index = self.position - 1;
        let landing = self
            .body
            .instructions
            .id_at(landing_index)
            .ok_or(Error::InvalidState("landing pad vanished right after being emitted"))?;
        let branch_index = self
            .body
            .instructions
            .position(block.placeholder)
            .ok_or(Error::InstructionNotFound(block.placeholder))?;

        let long = if block.inverted {
            Opcode::Brtrue
        } else {
            Opcode::Brfalse
        };
        let short = long.short_form().unwrap_or(long);
        let distance = branch_distance(
            &self.body.instructions,
            branch_index,
            landing_index,
            Instruction::unresolved_branch(short)?.width(),
        );
        let opcode = if self.allow_short_branches && SIGNED_8BIT_JUMP_RANGE.contains(&distance) {
            short
        } else {
            long
        };
        trace!(
            "close block {:?} with {} to {:?} ({} bytes)",
            block.placeholder,
            opcode,
            landing,
            distance
        );

        if let Some(node) = self.body.instructions.get_mut(branch_index) {
            node.instruction = Instruction {
                opcode,
                operand: Operand::Branch(Some(landing)),
            };
        }
        self.body.blocks.pop();
        Ok(self)
    }
}
