//! Transplanting one method body into another
//!
//! Splicing copies every instruction of a donor body into a target body at some position. The
//! donor is left untouched (the same guard body can be spliced into many methods), so everything
//! that refers to a donor-relative identity has to be translated:
//!
//!   - local indices are shifted past the target's existing locals, and the donor's locals are
//!     appended to the target's
//!
//!   - argument indices are mapped through the target's parameter list by position, receiver
//!     included (a donor `this` only maps onto a target `this`)
//!
//!   - branch targets and exception handler boundaries point at donor instructions, which have no
//!     meaning in the target. They are first recorded as donor byte offsets, then resolved to the
//!     fresh copies once the whole donor has been copied. Forward branches make this second pass
//!     unavoidable.
//!
//! A transform callback gets to see every copied instruction before any of this happens. It can
//! let it through (`None`), drop it (`Some(vec![])`), or swap it for target-relative instructions
//! (`Some(replacements)`), which are inserted as they are.
//!
//! Nothing in the target changes until every translation has succeeded.

use super::{
    Error, ExceptionHandler, InsnId, Instruction, MethodBody, MethodSignature, Operand, Writer,
};
use crate::util::{Offset, OffsetTable, Width};
use log::debug;
use std::collections::HashMap;

/// Callback offered each copied donor instruction during a splice
pub type Transform<'t, 'g> = dyn FnMut(&Instruction<'g>) -> Option<Vec<Instruction<'g>>> + 't;

/// What a splice added to the target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpliceResult {
    /// Inserted instructions, in order
    pub inserted: Vec<InsnId>,

    /// Index in the target of the first local copied from the donor
    pub first_local: u16,

    /// Number of locals copied from the donor
    pub locals_added: usize,

    /// Number of exception handlers copied from the donor
    pub handlers_added: usize,
}

/// Where a donor offset ends up in the target
#[derive(Copy, Clone, Debug)]
enum Slot {
    /// The copy at this index in the scratch list
    Copy(usize),

    /// Whatever follows the spliced code
    After,
}

/// Branch targets of a copy, still expressed as donor offsets
enum Pending {
    Nothing,
    Branch(Offset),
    Switch(Vec<Offset>),
}

struct Scratch<'g> {
    instruction: Instruction<'g>,
    pending: Pending,

    /// Donor instruction this was copied from
    origin: InsnId,
}

/// Resolved form of a [`Slot`] that lands on an instruction
#[derive(Copy, Clone, Debug)]
enum Anchor {
    Copy(usize),
    Existing(InsnId),
}

/// Donor handler with its boundaries resolved (`None` ends are end of body)
struct ResolvedHandler<'h, 'g> {
    handler: &'h ExceptionHandler<'g>,
    try_start: Anchor,
    try_end: Option<Anchor>,
    handler_start: Anchor,
    handler_end: Option<Anchor>,
    filter_start: Option<Anchor>,
}

/// Copy `donor` into `target` so that its first instruction ends up at position `insert_at`
pub fn splice<'g>(
    donor: &MethodBody<'g>,
    target: &mut MethodBody<'g>,
    insert_at: usize,
    transform: Option<&mut Transform<'_, 'g>>,
) -> Result<SpliceResult, Error> {
    if insert_at > target.instructions.len() {
        return Err(Error::OutOfRange {
            index: insert_at,
            len: target.instructions.len(),
        });
    }

    let first_local = target.locals.len();
    if first_local + donor.locals.len() > u16::MAX as usize + 1 {
        return Err(Error::ShapeMismatch(format!(
            "{} locals do not fit after the target's {}",
            donor.locals.len(),
            first_local
        )));
    }
    let arguments = ArgumentMap::new(&donor.method.signature, &target.method.signature);

    // Donor offsets
    let mut donor_offsets: HashMap<InsnId, Offset> = HashMap::new();
    let mut end_offset = Offset(0);
    for node in &donor.instructions {
        donor_offsets.insert(node.id, end_offset);
        end_offset.0 += node.instruction.width();
    }
    let offset_of = |id: InsnId| -> Result<Offset, Error> {
        donor_offsets
            .get(&id)
            .copied()
            .ok_or(Error::InstructionNotFound(id))
    };

    // First pass: copy, transform, remap operands, record branch targets as donor offsets
    let mut transform = transform;
    let mut scratch: Vec<Scratch<'g>> = vec![];
    let mut slots: OffsetTable<Slot> = OffsetTable::new();
    let mut unplaced: Vec<Offset> = vec![];
    for node in &donor.instructions {
        let offset = offset_of(node.id)?;
        let copy = node.instruction.clone();
        let replaced = match transform.as_mut() {
            Some(f) => (**f)(&copy),
            None => None,
        };

        let copies: Vec<Scratch<'g>> = match replaced {
            Some(replacements) => {
                if let Some(bad) = replacements
                    .iter()
                    .find(|insn| !insn.operand.fits(insn.opcode.operand_kind()))
                {
                    return Err(Error::operand_mismatch(bad.opcode, &bad.operand));
                }
                replacements
                    .into_iter()
                    .map(|instruction| Scratch {
                        instruction,
                        pending: Pending::Nothing,
                        origin: node.id,
                    })
                    .collect()
            }
            None => {
                let (instruction, pending) = remap(
                    copy,
                    node.id,
                    first_local as u16,
                    donor.locals.len(),
                    &arguments,
                    &offset_of,
                )?;
                vec![Scratch {
                    instruction,
                    pending,
                    origin: node.id,
                }]
            }
        };

        unplaced.push(offset);
        if !copies.is_empty() {
            for offset in unplaced.drain(..) {
                slots.insert_at(offset, Slot::Copy(scratch.len()));
            }
            scratch.extend(copies);
        }
    }
    unplaced.push(end_offset);
    for offset in unplaced.drain(..) {
        slots.insert_at(offset, Slot::After);
    }

    // Second pass: resolve every recorded offset, still without touching the target
    let following = target.instructions.id_at(insert_at);
    let land = |origin: InsnId, offset: Offset| -> Result<Option<Anchor>, Error> {
        match slots.get_offset(offset).ok() {
            Some(Slot::Copy(idx)) => Ok(Some(Anchor::Copy(*idx))),
            Some(Slot::After) => Ok(following.map(Anchor::Existing)),
            None => Err(Error::InvalidBranchOffset {
                from: offset_of(origin).map_or(0, |o| o.0),
                target: offset.0 as isize,
            }),
        }
    };
    let must_land = |origin: InsnId, offset: Offset| -> Result<Anchor, Error> {
        land(origin, offset)?.ok_or(Error::DanglingReference(origin))
    };

    let mut resolved: Vec<Vec<Anchor>> = Vec::with_capacity(scratch.len());
    for copy in &scratch {
        resolved.push(match &copy.pending {
            Pending::Nothing => vec![],
            Pending::Branch(offset) => vec![must_land(copy.origin, *offset)?],
            Pending::Switch(offsets) => offsets
                .iter()
                .map(|offset| must_land(copy.origin, *offset))
                .collect::<Result<_, _>>()?,
        });
    }

    let mut handlers: Vec<ResolvedHandler<'_, 'g>> = vec![];
    for handler in &donor.exception_handlers {
        let start = |id: InsnId| must_land(id, offset_of(id)?);
        let end = |id: Option<InsnId>| match id {
            Some(id) => land(id, offset_of(id)?),
            None => land(handler.try_start, end_offset),
        };
        handlers.push(ResolvedHandler {
            handler,
            try_start: start(handler.try_start)?,
            try_end: end(handler.try_end)?,
            handler_start: start(handler.handler_start)?,
            handler_end: end(handler.handler_end)?,
            filter_start: handler.filter_start.map(start).transpose()?,
        });
    }

    // Commit
    let mut inserted: Vec<InsnId> = Vec::with_capacity(scratch.len());
    for (offset, copy) in scratch.into_iter().enumerate() {
        inserted.push(
            target
                .instructions
                .insert(insert_at + offset, copy.instruction)?,
        );
    }
    let id_of = |anchor: Anchor| -> InsnId {
        match anchor {
            Anchor::Copy(idx) => inserted[idx],
            Anchor::Existing(id) => id,
        }
    };
    for (idx, anchors) in resolved.iter().enumerate() {
        if anchors.is_empty() {
            continue;
        }
        let position = insert_at + idx;
        let targets: Vec<InsnId> = anchors.iter().map(|anchor| id_of(*anchor)).collect();
        if let Some(node) = target.instructions.get_mut(position) {
            match &mut node.instruction.operand {
                Operand::Branch(slot) => *slot = targets.first().copied(),
                Operand::Switch(slots) => *slots = targets,
                _ => (),
            }
        }
    }

    let handlers_added = handlers.len();
    for entry in handlers {
        target.exception_handlers.push(ExceptionHandler {
            kind: entry.handler.kind,
            try_start: id_of(entry.try_start),
            try_end: entry.try_end.map(id_of),
            handler_start: id_of(entry.handler_start),
            handler_end: entry.handler_end.map(id_of),
            filter_start: entry.filter_start.map(id_of),
            catch_type: entry.handler.catch_type,
        });
    }
    target.locals.extend(donor.locals.iter().cloned());

    debug!(
        "spliced {:?} into {:?} at {}: {} instructions, {} locals, {} handlers",
        donor.method,
        target.method,
        insert_at,
        inserted.len(),
        donor.locals.len(),
        handlers_added
    );
    Ok(SpliceResult {
        inserted,
        first_local: first_local as u16,
        locals_added: donor.locals.len(),
        handlers_added,
    })
}

/// Remap the operand of a copied donor instruction
fn remap<'g>(
    mut instruction: Instruction<'g>,
    origin: InsnId,
    first_local: u16,
    donor_locals: usize,
    arguments: &ArgumentMap,
    offset_of: &impl Fn(InsnId) -> Result<Offset, Error>,
) -> Result<(Instruction<'g>, Pending), Error> {
    let mut pending = Pending::Nothing;
    match &mut instruction.operand {
        Operand::Local(idx) => {
            if *idx as usize >= donor_locals {
                return Err(Error::ShapeMismatch(format!(
                    "local {} used but the donor declares {}",
                    idx, donor_locals
                )));
            }
            *idx += first_local;
        }
        Operand::Argument(idx) => *idx = arguments.map(*idx)?,
        Operand::Branch(None) => return Err(Error::UnresolvedBranch(origin)),
        Operand::Branch(Some(target)) => pending = Pending::Branch(offset_of(*target)?),
        Operand::Switch(targets) => {
            pending = Pending::Switch(
                targets
                    .iter()
                    .map(|target| offset_of(*target))
                    .collect::<Result<_, _>>()?,
            )
        }
        _ => (),
    }
    Ok((instruction, pending))
}

/// Maps donor argument slots onto target argument slots
struct ArgumentMap {
    donor_has_this: bool,
    donor_parameters: usize,
    target_has_this: bool,
    target_parameters: usize,
}

impl ArgumentMap {
    fn new(donor: &MethodSignature<'_>, target: &MethodSignature<'_>) -> ArgumentMap {
        ArgumentMap {
            donor_has_this: donor.has_this,
            donor_parameters: donor.parameters.len(),
            target_has_this: target.has_this,
            target_parameters: target.parameters.len(),
        }
    }

    fn map(&self, slot: u16) -> Result<u16, Error> {
        if self.donor_has_this && slot == 0 {
            return if self.target_has_this {
                Ok(0)
            } else {
                Err(Error::ShapeMismatch(String::from(
                    "donor uses `this` but the target is static",
                )))
            };
        }
        let parameter = slot as usize - self.donor_has_this as usize;
        if parameter >= self.donor_parameters {
            return Err(Error::ShapeMismatch(format!(
                "argument {} used but the donor declares {} parameters",
                slot, self.donor_parameters
            )));
        }
        if parameter >= self.target_parameters {
            return Err(Error::ShapeMismatch(format!(
                "donor parameter {} has no counterpart among the target's {} parameters",
                parameter, self.target_parameters
            )));
        }
        Ok((parameter + self.target_has_this as usize) as u16)
    }
}

impl<'b, 'g> Writer<'b, 'g> {
    /// Splice a donor body in at the cursor, leaving the cursor after the spliced code
    pub fn splice(
        &mut self,
        donor: &MethodBody<'g>,
        transform: Option<&mut Transform<'_, 'g>>,
    ) -> Result<SpliceResult, Error> {
        let result = splice(donor, self.body, self.position, transform)?;
        self.position += result.inserted.len();
        if let Some(last) = result.inserted.last() {
            self.last_emitted = Some(*last);
        }
        Ok(result)
    }
}
