use super::blocks::Block;
use super::{InsnId, InstructionSequence, MethodData, TypeData};

/// Body of one method
///
/// Cloning produces an independent snapshot (instruction ids included), which is how the weaving
/// driver rolls a body back when a marker fails halfway through.
#[derive(Clone, Debug)]
pub struct MethodBody<'g> {
    /// Method this is the body of
    pub method: &'g MethodData<'g>,

    pub instructions: InstructionSequence<'g>,
    pub locals: Vec<LocalVariable<'g>>,
    pub exception_handlers: Vec<ExceptionHandler<'g>>,

    /// Zero-initialize locals on entry
    pub init_locals: bool,

    /// Structured blocks opened by a writer and not closed yet (innermost last)
    ///
    /// These live on the body rather than the writer, so a writer dropped halfway through a block
    /// leaves a trace that whoever commits the body can see.
    pub(crate) blocks: Vec<Block>,
}

impl<'g> MethodBody<'g> {
    /// Empty body
    pub fn new(method: &'g MethodData<'g>) -> MethodBody<'g> {
        MethodBody {
            method,
            instructions: InstructionSequence::new(),
            locals: vec![],
            exception_handlers: vec![],
            init_locals: true,
            blocks: vec![],
        }
    }

    /// Argument slots, including `this` for instance methods
    pub fn argument_count(&self) -> usize {
        self.method.signature.argument_count()
    }

    pub fn returns_value(&self) -> bool {
        self.method.signature.returns_value()
    }

    /// Number of structured blocks opened on this body and never closed
    pub fn open_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Declare a new local, returning its index
    pub fn add_local(&mut self, variable_type: &'g TypeData<'g>) -> u16 {
        self.locals.push(LocalVariable {
            variable_type,
            pinned: false,
        });
        (self.locals.len() - 1) as u16
    }

    /// Is an instruction the target of a branch or the boundary of an exception handler?
    pub fn is_referenced(&self, id: InsnId) -> bool {
        self.instructions.is_referenced(id)
            || self.exception_handlers.iter().any(|h| h.references(id))
    }

    /// Move every branch and handler boundary pointing at `from` onto `to`
    pub fn retarget(&mut self, from: InsnId, to: InsnId) {
        self.instructions.retarget(from, to);
        for handler in &mut self.exception_handlers {
            handler.retarget(from, to);
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocalVariable<'g> {
    pub variable_type: &'g TypeData<'g>,

    /// Pinned locals keep the object they point to from moving
    pub pinned: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Catch,
    Filter,
    Finally,
    Fault,
}

/// Protected region and its handler
///
/// Boundaries point at instructions. An end boundary of `None` means the region runs to the end
/// of the body.
#[derive(Clone, Debug)]
pub struct ExceptionHandler<'g> {
    pub kind: HandlerKind,
    pub try_start: InsnId,
    pub try_end: Option<InsnId>,
    pub handler_start: InsnId,
    pub handler_end: Option<InsnId>,

    /// Start of the filter block (only for [`HandlerKind::Filter`])
    pub filter_start: Option<InsnId>,

    /// Exception type caught (only for [`HandlerKind::Catch`])
    pub catch_type: Option<&'g TypeData<'g>>,
}

impl<'g> ExceptionHandler<'g> {
    fn boundaries(&self) -> [Option<InsnId>; 5] {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
            self.filter_start,
        ]
    }

    pub fn references(&self, id: InsnId) -> bool {
        self.boundaries().contains(&Some(id))
    }

    pub fn retarget(&mut self, from: InsnId, to: InsnId) {
        let swap = |boundary: &mut InsnId| {
            if *boundary == from {
                *boundary = to;
            }
        };
        swap(&mut self.try_start);
        swap(&mut self.handler_start);
        for boundary in [
            &mut self.try_end,
            &mut self.handler_end,
            &mut self.filter_start,
        ]
        .into_iter()
        .flatten()
        {
            swap(boundary);
        }
    }
}
