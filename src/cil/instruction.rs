use super::{
    CallSiteData, Error, FieldData, MacroForm, MemberRef, MethodData, Opcode, OperandKind,
    TypeData,
};
use crate::util::{Offset, OffsetTable, Width};
use std::fmt;

/// Identity of an instruction inside one [`InstructionSequence`]
///
/// Positions shift on every insertion and removal, identities don't. Branches, switches and
/// exception handler boundaries all point at instructions through these.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct InsnId(usize);

impl InsnId {
    pub fn next(&self) -> InsnId {
        InsnId(self.0 + 1)
    }
}

impl fmt::Debug for InsnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("i{}", self.0))
    }
}

/// Generates fresh instruction identities
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of ids as the original.
#[derive(Clone, Debug)]
pub struct InsnIdGenerator(InsnId);

impl InsnIdGenerator {
    pub fn new() -> InsnIdGenerator {
        InsnIdGenerator(InsnId(0))
    }

    pub fn fresh_id(&mut self) -> InsnId {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl Default for InsnIdGenerator {
    fn default() -> Self {
        InsnIdGenerator::new()
    }
}

/// Operand of an instruction
///
/// Metadata references compare by identity, floats compare by bit pattern.
#[derive(Clone, Debug)]
pub enum Operand<'g> {
    None,
    Int8(i8),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),

    /// Target of a branch (`None` only while a structured block is still open)
    Branch(Option<InsnId>),
    Switch(Vec<InsnId>),
    Local(u16),
    Argument(u16),
    Type(&'g TypeData<'g>),
    Method(&'g MethodData<'g>),
    Field(&'g FieldData<'g>),
    Token(MemberRef<'g>),
    CallSite(&'g CallSiteData<'g>),
}

impl<'g> Operand<'g> {
    /// Can this operand follow an opcode whose operand has the given shape?
    pub fn fits(&self, kind: OperandKind) -> bool {
        matches!(
            (self, kind),
            (Operand::None, OperandKind::InlineNone)
                | (Operand::Branch(_), OperandKind::ShortInlineBrTarget)
                | (Operand::Branch(_), OperandKind::InlineBrTarget)
                | (Operand::Switch(_), OperandKind::InlineSwitch)
                | (Operand::Int8(_), OperandKind::ShortInlineI)
                | (Operand::Int32(_), OperandKind::InlineI)
                | (Operand::Int64(_), OperandKind::InlineI8)
                | (Operand::Float32(_), OperandKind::ShortInlineR)
                | (Operand::Float64(_), OperandKind::InlineR)
                | (Operand::String(_), OperandKind::InlineString)
                | (Operand::Local(_), OperandKind::InlineVar)
                | (Operand::Argument(_), OperandKind::InlineArg)
                | (Operand::Type(_), OperandKind::InlineType)
                | (Operand::Method(_), OperandKind::InlineMethod)
                | (Operand::Field(_), OperandKind::InlineField)
                | (Operand::Token(_), OperandKind::InlineTok)
                | (Operand::CallSite(_), OperandKind::InlineSig)
        )
    }
}

impl<'g> PartialEq for Operand<'g> {
    fn eq(&self, other: &Operand<'g>) -> bool {
        use std::ptr::eq;
        match (self, other) {
            (Operand::None, Operand::None) => true,
            (Operand::Int8(a), Operand::Int8(b)) => a == b,
            (Operand::Int32(a), Operand::Int32(b)) => a == b,
            (Operand::Int64(a), Operand::Int64(b)) => a == b,
            (Operand::Float32(a), Operand::Float32(b)) => a.to_bits() == b.to_bits(),
            (Operand::Float64(a), Operand::Float64(b)) => a.to_bits() == b.to_bits(),
            (Operand::String(a), Operand::String(b)) => a == b,
            (Operand::Branch(a), Operand::Branch(b)) => a == b,
            (Operand::Switch(a), Operand::Switch(b)) => a == b,
            (Operand::Local(a), Operand::Local(b)) => a == b,
            (Operand::Argument(a), Operand::Argument(b)) => a == b,
            (Operand::Type(a), Operand::Type(b)) => eq(*a, *b),
            (Operand::Method(a), Operand::Method(b)) => eq(*a, *b),
            (Operand::Field(a), Operand::Field(b)) => eq(*a, *b),
            (Operand::Token(a), Operand::Token(b)) => a == b,
            (Operand::CallSite(a), Operand::CallSite(b)) => eq(*a, *b),
            _ => false,
        }
    }
}

/// One CIL instruction: an opcode and its operand
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction<'g> {
    pub opcode: Opcode,
    pub operand: Operand<'g>,
}

impl<'g> Instruction<'g> {
    /// Make an instruction, checking that the operand fits the opcode
    pub fn new(opcode: Opcode, operand: Operand<'g>) -> Result<Instruction<'g>, Error> {
        if operand.fits(opcode.operand_kind()) {
            Ok(Instruction { opcode, operand })
        } else {
            Err(Error::operand_mismatch(opcode, &operand))
        }
    }

    /// Instruction without operand
    pub fn simple(opcode: Opcode) -> Result<Instruction<'g>, Error> {
        Instruction::new(opcode, Operand::None)
    }

    /// Branch whose target gets filled in later
    pub fn unresolved_branch(opcode: Opcode) -> Result<Instruction<'g>, Error> {
        Instruction::new(opcode, Operand::Branch(None))
    }

    pub fn nop() -> Instruction<'g> {
        Instruction {
            opcode: Opcode::Nop,
            operand: Operand::None,
        }
    }

    /// Value that selects between the encodings of a merged opcode (eg. the local index of `ldloc`)
    pub fn macro_value(&self) -> Option<i64> {
        match (self.opcode, &self.operand) {
            (Opcode::LdcI4, Operand::Int32(value)) => Some(*value as i64),
            (_, Operand::Local(idx)) | (_, Operand::Argument(idx)) => Some(*idx as i64),
            _ => None,
        }
    }

    /// Instructions this one may jump to
    pub fn targets(&self) -> Vec<InsnId> {
        match &self.operand {
            Operand::Branch(Some(target)) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => vec![],
        }
    }

    /// Does this instruction jump to `id`?
    pub fn references(&self, id: InsnId) -> bool {
        match &self.operand {
            Operand::Branch(Some(target)) => *target == id,
            Operand::Switch(targets) => targets.contains(&id),
            _ => false,
        }
    }

    /// Redirect every jump to `from` onto `to`
    pub fn retarget(&mut self, from: InsnId, to: InsnId) {
        match &mut self.operand {
            Operand::Branch(Some(target)) if *target == from => *target = to,
            Operand::Switch(targets) => {
                for target in targets.iter_mut().filter(|t| **t == from) {
                    *target = to;
                }
            }
            _ => (),
        }
    }
}

impl<'g> Width for Instruction<'g> {
    fn width(&self) -> usize {
        if let Some(form) = self
            .macro_value()
            .and_then(|value| MacroForm::shortest(self.opcode, value))
        {
            return form.width();
        }
        let operand = match self.opcode.operand_kind() {
            OperandKind::InlineNone => 0,
            OperandKind::ShortInlineBrTarget | OperandKind::ShortInlineI => 1,
            OperandKind::InlineVar | OperandKind::InlineArg => 2,
            OperandKind::InlineI8 | OperandKind::InlineR => 8,
            OperandKind::InlineSwitch => match &self.operand {
                Operand::Switch(targets) => 4 + 4 * targets.len(),
                _ => 4,
            },
            _ => 4,
        };
        self.opcode.size() + operand
    }
}

impl<'g> fmt::Display for Instruction<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(i) => write!(f, " {}", i),
            Operand::Int32(i) => write!(f, " {}", i),
            Operand::Int64(i) => write!(f, " {}", i),
            Operand::Float32(x) => write!(f, " {}", x),
            Operand::Float64(x) => write!(f, " {}", x),
            Operand::String(s) => write!(f, " {:?}", s),
            Operand::Branch(Some(target)) => write!(f, " {:?}", target),
            Operand::Branch(None) => f.write_str(" ?"),
            Operand::Switch(targets) => write!(f, " {:?}", targets),
            Operand::Local(idx) => write!(f, " V_{}", idx),
            Operand::Argument(idx) => write!(f, " A_{}", idx),
            Operand::Type(ty) => write!(f, " {:?}", ty),
            Operand::Method(method) => write!(f, " {:?}", method),
            Operand::Field(field) => write!(f, " {:?}", field),
            Operand::Token(member) => write!(f, " {:?}", member),
            Operand::CallSite(call_site) => write!(f, " {:?}", call_site),
        }
    }
}

/// Instruction placed in a sequence
#[derive(Clone, Debug)]
pub struct Node<'g> {
    pub id: InsnId,
    pub instruction: Instruction<'g>,

    /// Byte offset, as last decoded or computed (stale after edits until recomputed)
    pub offset: Option<Offset>,
}

/// Ordered instructions of one method body
///
/// Positional lookup of an id is a linear scan. Editing happens through [`super::Writer`], which
/// keeps the cursor in sync; the mutating methods here are the raw primitives underneath.
#[derive(Clone, Default)]
pub struct InstructionSequence<'g> {
    nodes: Vec<Node<'g>>,
    ids: InsnIdGenerator,
}

impl<'g> InstructionSequence<'g> {
    pub fn new() -> InstructionSequence<'g> {
        InstructionSequence {
            nodes: vec![],
            ids: InsnIdGenerator::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node<'g>> {
        self.nodes.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Node<'g>> {
        self.nodes.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Node<'g>> {
        self.nodes.get_mut(index)
    }

    /// Current position of an instruction
    pub fn position(&self, id: InsnId) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    pub fn contains(&self, id: InsnId) -> bool {
        self.position(id).is_some()
    }

    pub fn instruction(&self, id: InsnId) -> Option<&Instruction<'g>> {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .map(|node| &node.instruction)
    }

    /// Id of the instruction at a position
    pub fn id_at(&self, index: usize) -> Option<InsnId> {
        self.nodes.get(index).map(|node| node.id)
    }

    /// Append an instruction
    pub fn push(&mut self, instruction: Instruction<'g>) -> InsnId {
        let id = self.ids.fresh_id();
        self.nodes.push(Node {
            id,
            instruction,
            offset: None,
        });
        id
    }

    /// Insert an instruction so that it ends up at position `index`
    pub fn insert(&mut self, index: usize, instruction: Instruction<'g>) -> Result<InsnId, Error> {
        if index > self.nodes.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.nodes.len(),
            });
        }
        let id = self.ids.fresh_id();
        self.nodes.insert(
            index,
            Node {
                id,
                instruction,
                offset: None,
            },
        );
        Ok(id)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Node<'g> {
        self.nodes.remove(index)
    }

    /// Is any branch or switch in the sequence pointing at `id`?
    pub fn is_referenced(&self, id: InsnId) -> bool {
        self.nodes.iter().any(|node| node.instruction.references(id))
    }

    /// Redirect every branch and switch pointing at `from` onto `to`
    pub fn retarget(&mut self, from: InsnId, to: InsnId) {
        for node in &mut self.nodes {
            node.instruction.retarget(from, to);
        }
    }

    /// Fill in the offset cache of every instruction, returning the total byte length
    pub fn compute_offsets(&mut self) -> Offset {
        let mut offset = Offset(0);
        for node in &mut self.nodes {
            node.offset = Some(offset);
            offset.0 += node.instruction.width();
        }
        offset
    }

    /// Byte offset of every instruction (computed from widths, ignoring the cache)
    pub fn layout(&self) -> OffsetTable<InsnId> {
        let mut table = OffsetTable::new();
        let mut offset = Offset(0);
        for node in &self.nodes {
            table.insert_at(offset, node.id);
            offset.0 += node.instruction.width();
        }
        table
    }

    /// Total encoded length in bytes
    pub fn byte_len(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| node.instruction.width())
            .sum()
    }

    /// Same opcodes, same operands, and same branch topology
    ///
    /// Branch targets are compared by position, so two independently built (or decoded)
    /// sequences can be equal even though their instruction ids differ.
    pub fn structurally_eq(&self, other: &InstructionSequence<'g>) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let same_target = |a: &InsnId, b: &InsnId| -> bool {
            match (self.position(*a), other.position(*b)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        };
        self.nodes.iter().zip(other.nodes.iter()).all(|(a, b)| {
            let (a, b) = (&a.instruction, &b.instruction);
            if a.opcode != b.opcode {
                return false;
            }
            match (&a.operand, &b.operand) {
                (Operand::Branch(Some(x)), Operand::Branch(Some(y))) => same_target(x, y),
                (Operand::Switch(xs), Operand::Switch(ys)) => {
                    xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| same_target(x, y))
                }
                (x, y) => x == y,
            }
        })
    }
}

impl<'a, 'g> IntoIterator for &'a InstructionSequence<'g> {
    type Item = &'a Node<'g>;
    type IntoIter = std::slice::Iter<'a, Node<'g>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl<'g> fmt::Debug for InstructionSequence<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for node in &self.nodes {
            list.entry(&format_args!("{:?}: {}", node.id, node.instruction));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn insn<'g>(opcode: Opcode, operand: Operand<'g>) -> Instruction<'g> {
        Instruction::new(opcode, operand).unwrap()
    }

    #[test]
    fn operand_shape_is_checked() {
        assert!(Instruction::new(Opcode::Ldloc, Operand::Local(1)).is_ok());
        assert!(matches!(
            Instruction::new(Opcode::Ldloc, Operand::Argument(1)),
            Err(Error::OperandMismatch {
                opcode: Opcode::Ldloc,
                ..
            })
        ));
        assert!(Instruction::simple(Opcode::Br).is_err());
        assert!(Instruction::unresolved_branch(Opcode::BrS).is_ok());
    }

    #[test]
    fn widths_use_shortest_encoding() {
        assert_eq!(insn(Opcode::LdcI4, Operand::Int32(3)).width(), 1);
        assert_eq!(insn(Opcode::LdcI4, Operand::Int32(100)).width(), 2);
        assert_eq!(insn(Opcode::LdcI4, Operand::Int32(1000)).width(), 5);
        assert_eq!(insn(Opcode::Ldarg, Operand::Argument(0)).width(), 1);
        assert_eq!(insn(Opcode::Starg, Operand::Argument(0)).width(), 2);
        assert_eq!(insn(Opcode::Ldloc, Operand::Local(1000)).width(), 4);
        assert_eq!(insn(Opcode::BrS, Operand::Branch(None)).width(), 2);
        assert_eq!(insn(Opcode::Br, Operand::Branch(None)).width(), 5);
        assert_eq!(insn(Opcode::Ceq, Operand::None).width(), 2);
        assert_eq!(insn(Opcode::LdcR8, Operand::Float64(1.5)).width(), 9);
    }

    #[test]
    fn ids_survive_insertions() {
        let mut seq = InstructionSequence::new();
        let first = seq.push(Instruction::nop());
        let last = seq.push(insn(Opcode::Ret, Operand::None));
        let middle = seq.insert(1, insn(Opcode::LdcI4, Operand::Int32(1))).unwrap();

        assert_eq!(seq.position(first), Some(0));
        assert_eq!(seq.position(middle), Some(1));
        assert_eq!(seq.position(last), Some(2));
        assert!(matches!(
            seq.insert(5, Instruction::nop()),
            Err(Error::OutOfRange { index: 5, len: 3 })
        ));
    }

    #[test]
    fn layout_and_offsets_agree() {
        let mut seq = InstructionSequence::new();
        seq.push(insn(Opcode::LdcI4, Operand::Int32(1000)));
        let ret = seq.push(insn(Opcode::Ret, Operand::None));

        assert_eq!(seq.compute_offsets(), Offset(6));
        assert_eq!(seq.get(1).unwrap().offset, Some(Offset(5)));
        assert_eq!(seq.layout().get_offset(Offset(5)).ok(), Some(&ret));
        assert_eq!(seq.byte_len(), 6);
    }

    #[test]
    fn structural_equality_compares_topology() {
        let build = |padding: usize| {
            let mut seq = InstructionSequence::new();
            // Burn some ids so the two sequences disagree on identities
            for _ in 0..padding {
                let id = seq.push(Instruction::nop());
                let pos = seq.position(id).unwrap();
                seq.remove(pos);
            }
            let branch = seq.push(insn(Opcode::BrS, Operand::Branch(None)));
            let target = seq.push(insn(Opcode::Ret, Operand::None));
            seq.get_mut(0).unwrap().instruction.operand = Operand::Branch(Some(target));
            (seq, branch)
        };
        let (first, _) = build(0);
        let (second, _) = build(3);
        assert!(first.structurally_eq(&second));

        let (mut third, branch) = build(1);
        third.retarget(third.id_at(1).unwrap(), branch);
        assert!(!first.structurally_eq(&third));
    }
}
