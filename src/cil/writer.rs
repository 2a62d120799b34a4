use super::{
    stack_depth, stack_effect, Error, InsnId, Instruction, InstructionSequence, MethodBody,
    Opcode, Operand, TypeData,
};
use crate::weave::Settings;
use log::trace;

/// Cursor over the instructions of one method body
///
/// The cursor is a position in `[0, len]`: emitting inserts at the cursor and moves it past the
/// new instruction. Every other edit keeps the cursor pointing at the same instruction it did
/// before the edit, which is what makes it safe to insert code somewhere else in the body and then
/// carry on emitting where you were.
///
/// ### Structured blocks
///
/// `if`/`unless` blocks are opened with [`Writer::begin_if`] or [`Writer::begin_unless`], and
/// closed with [`Writer::end`]. The branch that skips the block is only materialized on `end()`,
/// once its distance is known, so short encodings get used whenever they fit.
///
/// ### Repositioning
///
/// Markers often need to inject code "before the arguments of this call were pushed". The writer
/// can walk backwards (or forwards) counting evaluation stack effects to find such a spot
/// ([`Writer::reposition_by`], [`Writer::reposition_to_empty_stack`]), and saved states let the
/// caller come back to where it was afterwards, even if the body grew in the meantime.
///
/// The writer holds the only mutable borrow of the body, so a body cannot be swapped out (or
/// edited by someone else) while a writer over it is still alive.
pub struct Writer<'b, 'g> {
    pub(super) body: &'b mut MethodBody<'g>,

    /// Insertion point, in `[0, len]`
    pub(super) position: usize,

    /// States saved with `save_state`
    saved: Vec<SavedState>,

    /// Most recently inserted instruction
    pub(super) last_emitted: Option<InsnId>,

    /// Use one-byte branch offsets when the distance fits
    pub(super) allow_short_branches: bool,

    /// Reject `finish` while blocks are open
    finish_requires_closed_blocks: bool,
}

#[derive(Copy, Clone, Debug)]
struct SavedState {
    length: usize,
    position: usize,
}

impl<'b, 'g> Writer<'b, 'g> {
    /// Writer positioned at the start of the body
    pub fn new(body: &'b mut MethodBody<'g>) -> Writer<'b, 'g> {
        Writer::with_settings(body, &Settings::default())
    }

    pub fn with_settings(body: &'b mut MethodBody<'g>, settings: &Settings) -> Writer<'b, 'g> {
        Writer {
            body,
            position: 0,
            saved: vec![],
            last_emitted: None,
            allow_short_branches: settings.allow_short_branches,
            finish_requires_closed_blocks: settings.finish_requires_closed_blocks,
        }
    }

    pub fn body(&self) -> &MethodBody<'g> {
        self.body
    }

    /// Declare a new local in the body, returning its index
    pub fn add_local(&mut self, variable_type: &'g TypeData<'g>) -> u16 {
        self.body.add_local(variable_type)
    }

    pub fn instructions(&self) -> &InstructionSequence<'g> {
        &self.body.instructions
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of instructions in the body
    pub fn len(&self) -> usize {
        self.body.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.instructions.is_empty()
    }

    /// Number of structured blocks still open on the body
    pub fn open_blocks(&self) -> usize {
        self.body.open_blocks()
    }

    /// Identity of the most recently inserted instruction
    pub fn last_emitted(&self) -> Option<InsnId> {
        self.last_emitted
    }

    /// Instruction right after the cursor, if any
    pub fn current(&self) -> Option<InsnId> {
        self.body.instructions.id_at(self.position)
    }

    fn locate(&self, id: InsnId) -> Result<usize, Error> {
        self.body
            .instructions
            .position(id)
            .ok_or(Error::InstructionNotFound(id))
    }

    pub fn goto_start(&mut self) -> Result<&mut Self, Error> {
        self.position = 0;
        Ok(self)
    }

    pub fn goto_end(&mut self) -> Result<&mut Self, Error> {
        self.position = self.len();
        Ok(self)
    }

    /// Move the cursor just before the instruction at `index`
    pub fn goto_index(&mut self, index: usize) -> Result<&mut Self, Error> {
        if index >= self.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.len(),
            });
        }
        self.position = index;
        Ok(self)
    }

    pub fn goto_before(&mut self, id: InsnId) -> Result<&mut Self, Error> {
        self.position = self.locate(id)?;
        Ok(self)
    }

    pub fn goto_after(&mut self, id: InsnId) -> Result<&mut Self, Error> {
        self.position = self.locate(id)? + 1;
        Ok(self)
    }

    /// Emit an instruction without operand
    pub fn emit(&mut self, opcode: Opcode) -> Result<&mut Self, Error> {
        self.emit_instruction(Instruction::simple(opcode)?)
    }

    /// Emit an instruction with an operand
    pub fn emit_with(&mut self, opcode: Opcode, operand: Operand<'g>) -> Result<&mut Self, Error> {
        self.emit_instruction(Instruction::new(opcode, operand)?)
    }

    /// Insert an instruction at the cursor and move the cursor past it
    ///
    /// Every other `emit*` method ends up here.
    pub fn emit_instruction(&mut self, instruction: Instruction<'g>) -> Result<&mut Self, Error> {
        if !instruction.operand.fits(instruction.opcode.operand_kind()) {
            return Err(Error::operand_mismatch(
                instruction.opcode,
                &instruction.operand,
            ));
        }
        trace!("emit {} at {}", instruction, self.position);
        let id = self.body.instructions.insert(self.position, instruction)?;
        self.position += 1;
        self.last_emitted = Some(id);
        Ok(self)
    }

    /// Insert instructions so that the first one ends up at `index`
    ///
    /// If the cursor is at or after `index`, it moves along with the instruction it was in front
    /// of.
    pub fn insert_at(
        &mut self,
        index: usize,
        instructions: Vec<Instruction<'g>>,
    ) -> Result<&mut Self, Error> {
        if index > self.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.len(),
            });
        }
        if let Some(bad) = instructions
            .iter()
            .find(|insn| !insn.operand.fits(insn.opcode.operand_kind()))
        {
            return Err(Error::operand_mismatch(bad.opcode, &bad.operand));
        }

        let count = instructions.len();
        for (offset, instruction) in instructions.into_iter().enumerate() {
            let id = self.body.instructions.insert(index + offset, instruction)?;
            self.last_emitted = Some(id);
        }
        if index <= self.position {
            self.position += count;
        }
        trace!("inserted {} instructions at {}", count, index);
        Ok(self)
    }

    /// Swap one instruction for zero or more others
    ///
    /// Branches, switches and exception handler boundaries that referred to the replaced
    /// instruction now refer to the first replacement, or (if there are no replacements) to the
    /// instruction that followed it. The cursor is shifted by the change in length only if it was
    /// after the replaced instruction.
    pub fn replace(
        &mut self,
        target: InsnId,
        replacements: Vec<Instruction<'g>>,
    ) -> Result<&mut Self, Error> {
        let index = self.locate(target)?;
        if self.body.blocks.iter().any(|block| block.placeholder == target) {
            return Err(Error::InvalidState(
                "cannot replace the placeholder of an open block",
            ));
        }
        if let Some(bad) = replacements
            .iter()
            .find(|insn| !insn.operand.fits(insn.opcode.operand_kind()))
        {
            return Err(Error::operand_mismatch(bad.opcode, &bad.operand));
        }

        // Check for references that would be left dangling before touching anything
        let successor = self.body.instructions.id_at(index + 1);
        let referenced = self.body.exception_handlers.iter().any(|h| h.references(target))
            || self
                .body
                .instructions
                .iter()
                .any(|node| node.id != target && node.instruction.references(target));
        if replacements.is_empty() && successor.is_none() && referenced {
            return Err(Error::DanglingReference(target));
        }

        trace!(
            "replacing {:?} at {} with {} instructions",
            target,
            index,
            replacements.len()
        );
        let count = replacements.len();
        let mut first_replacement = None;
        for (offset, instruction) in replacements.into_iter().enumerate() {
            let id = self
                .body
                .instructions
                .insert(index + 1 + offset, instruction)?;
            first_replacement.get_or_insert(id);
            self.last_emitted = Some(id);
        }
        if let Some(new_target) = first_replacement.or(successor) {
            self.body.retarget(target, new_target);
        }
        self.body.instructions.remove(index);

        if self.last_emitted == Some(target) {
            self.last_emitted = None;
        }
        if self.position > index {
            self.position = self.position + count - 1;
        }
        Ok(self)
    }

    /// Remove one instruction (same as replacing it with nothing)
    pub fn remove(&mut self, target: InsnId) -> Result<&mut Self, Error> {
        self.replace(target, vec![])
    }

    /// Point a branch instruction at a target
    pub fn resolve_branch(&mut self, branch: InsnId, target: InsnId) -> Result<&mut Self, Error> {
        self.locate(target)?;
        let index = self.locate(branch)?;
        if let Some(node) = self.body.instructions.get_mut(index) {
            match &mut node.instruction.operand {
                Operand::Branch(slot) => *slot = Some(target),
                other => {
                    return Err(Error::operand_mismatch(node.instruction.opcode, other));
                }
            }
        }
        Ok(self)
    }

    /// Visit every instruction, from the first one
    ///
    /// See [`Writer::for_each_from`].
    pub fn for_each<F>(&mut self, visit: F) -> Result<&mut Self, Error>
    where
        F: FnMut(&mut Writer<'b, 'g>, InsnId) -> Result<(), Error>,
    {
        self.for_each_from(0, visit)
    }

    /// Visit every instruction from position `start` onwards
    ///
    /// Before each visit, the cursor is placed just before the visited instruction. The visitor
    /// may edit the body freely: afterwards, iteration resumes right after the visited
    /// instruction (wherever it ended up), or at the cursor if the visitor removed it.
    pub fn for_each_from<F>(&mut self, start: usize, mut visit: F) -> Result<&mut Self, Error>
    where
        F: FnMut(&mut Writer<'b, 'g>, InsnId) -> Result<(), Error>,
    {
        if start > self.len() {
            return Err(Error::OutOfRange {
                index: start,
                len: self.len(),
            });
        }
        let mut index = start;
        while let Some(id) = self.body.instructions.id_at(index) {
            self.position = index;
            visit(self, id)?;
            index = match self.body.instructions.position(id) {
                Some(now_at) => now_at + 1,
                None => self.position,
            };
        }
        Ok(self)
    }

    /// Remember the cursor (and the current length)
    pub fn save_state(&mut self) -> Result<&mut Self, Error> {
        self.saved.push(SavedState {
            length: self.len(),
            position: self.position,
        });
        Ok(self)
    }

    /// Return to the most recently saved cursor, shifted by how much the body grew or shrank
    pub fn restore_state(&mut self) -> Result<&mut Self, Error> {
        let saved = self
            .saved
            .pop()
            .ok_or(Error::InvalidState("no saved state to restore"))?;
        let drift = self.len() as isize - saved.length as isize;
        let position = saved.position as isize + drift;
        self.position = position.clamp(0, self.len() as isize) as usize;
        Ok(self)
    }

    /// Number of values on the stack at the cursor (counting from the start of the body)
    pub fn stack_depth(&self) -> Result<i32, Error> {
        stack_depth(
            &self.body.instructions,
            0,
            self.position,
            self.body.returns_value(),
        )
    }

    /// Walk backwards until the evaluation stack is empty at the cursor
    ///
    /// On failure the cursor is left where it was.
    pub fn reposition_to_empty_stack(&mut self) -> Result<&mut Self, Error> {
        let start = self.position;
        let result = self.walk_back_to_empty();
        if result.is_err() {
            self.position = start;
        }
        result?;
        Ok(self)
    }

    fn walk_back_to_empty(&mut self) -> Result<(), Error> {
        let returns_value = self.body.returns_value();
        let mut depth = self.stack_depth()?;
        while depth > 0 {
            if self.position == 0 {
                return Err(Error::StackExhausted {
                    requested: 0,
                    reached: depth,
                });
            }
            self.position -= 1;
            depth -= self.effect_at(self.position, returns_value)?;
        }
        trace!("repositioned to empty stack at {}", self.position);
        Ok(())
    }

    /// Walk to the nearest position where the stack holds exactly `delta` more (or fewer) values
    ///
    /// A negative `delta` walks backwards, a positive one forwards. On failure the cursor is left
    /// where it was.
    pub fn reposition_by(&mut self, delta: i32) -> Result<&mut Self, Error> {
        let start = self.position;
        let result = self.walk_by(delta);
        if result.is_err() {
            self.position = start;
        }
        result?;
        Ok(self)
    }

    fn walk_by(&mut self, delta: i32) -> Result<(), Error> {
        let returns_value = self.body.returns_value();
        let mut depth = self.stack_depth()?;
        let target = depth + delta;
        while depth != target {
            if delta < 0 {
                if self.position == 0 {
                    return Err(Error::StackExhausted {
                        requested: target,
                        reached: depth,
                    });
                }
                self.position -= 1;
                depth -= self.effect_at(self.position, returns_value)?;
            } else {
                if self.position >= self.len() {
                    return Err(Error::StackExhausted {
                        requested: target,
                        reached: depth,
                    });
                }
                depth += self.effect_at(self.position, returns_value)?;
                self.position += 1;
            }
        }
        trace!("repositioned by {} to {}", delta, self.position);
        Ok(())
    }

    fn effect_at(&self, index: usize, returns_value: bool) -> Result<i32, Error> {
        match self.body.instructions.get(index) {
            Some(node) => stack_effect(&node.instruction, returns_value),
            None => Err(Error::OutOfRange {
                index,
                len: self.len(),
            }),
        }
    }

    /// Release the body
    ///
    /// Fails if a structured block is still open or a branch was never given a target.
    pub fn finish(self) -> Result<(), Error> {
        if self.finish_requires_closed_blocks && !self.body.blocks.is_empty() {
            return Err(Error::UnbalancedStructure {
                open_blocks: self.body.blocks.len(),
            });
        }
        if let Some(node) = self
            .body
            .instructions
            .iter()
            .find(|node| matches!(node.instruction.operand, Operand::Branch(None)))
        {
            return Err(Error::UnresolvedBranch(node.id));
        }
        Ok(())
    }
}
