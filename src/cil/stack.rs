//! Evaluation stack bookkeeping
//!
//! This is not a verifier: it only counts values, so that the writer can find places in a body
//! where the stack holds a given number of them. Control flow is ignored entirely; depths are
//! summed along the linear instruction order.

use super::{Error, Instruction, InstructionSequence, MethodSignature, Opcode, Operand, StackCount};

/// Net change in stack depth caused by one instruction
///
/// `returns_value` describes the method the instruction is in (it decides what `ret` pops).
/// Calls are resolved through their operand's signature; a call-like instruction without a
/// resolved signature is an error rather than a guess.
pub fn stack_effect(insn: &Instruction<'_>, returns_value: bool) -> Result<i32, Error> {
    let behaviour = insn.opcode.stack_behaviour();
    if let (StackCount::Fixed(pops), StackCount::Fixed(pushes)) =
        (behaviour.pops, behaviour.pushes)
    {
        return Ok(pushes as i32 - pops as i32);
    }

    let returned = |signature: &MethodSignature<'_>| signature.returns_value() as i32;
    match (insn.opcode, &insn.operand) {
        (Opcode::Ret, _) => Ok(-(returns_value as i32)),
        (Opcode::Call | Opcode::Callvirt, Operand::Method(method)) => {
            let signature = &method.signature;
            Ok(returned(signature) - signature.argument_count() as i32)
        }
        (Opcode::Newobj, Operand::Method(method)) => {
            Ok(1 - method.signature.parameters.len() as i32)
        }
        (Opcode::Calli, Operand::CallSite(call_site)) => {
            let signature = &call_site.signature;
            // The function pointer is popped too
            Ok(returned(signature) - signature.argument_count() as i32 - 1)
        }
        (opcode, _) => Err(Error::UnknownStackEffect(opcode)),
    }
}

/// Number of values on the stack just before the instruction at `end`, counting from `start`
///
/// Sums [`stack_effect`] over the half-open range `[start, end)`.
pub fn stack_depth(
    instructions: &InstructionSequence<'_>,
    start: usize,
    end: usize,
    returns_value: bool,
) -> Result<i32, Error> {
    if end > instructions.len() || start > end {
        return Err(Error::OutOfRange {
            index: end.max(start),
            len: instructions.len(),
        });
    }
    let mut depth = 0;
    for node in instructions.iter().skip(start).take(end - start) {
        depth += stack_effect(&node.instruction, returns_value)?;
    }
    Ok(depth)
}
