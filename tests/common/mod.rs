#![allow(dead_code)]

use cilweave::cil::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn static_method<'g>(
    graph: &MetadataGraph<'g>,
    ty: &'g TypeData<'g>,
    name: &str,
    parameters: Vec<&'g TypeData<'g>>,
    return_type: Option<&'g TypeData<'g>>,
) -> &'g MethodData<'g> {
    graph.add_method(MethodData::new(
        ty,
        name,
        MethodSignature::new(false, parameters, return_type),
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
    ))
}

pub fn instance_method<'g>(
    graph: &MetadataGraph<'g>,
    ty: &'g TypeData<'g>,
    name: &str,
    parameters: Vec<&'g TypeData<'g>>,
    return_type: Option<&'g TypeData<'g>>,
) -> &'g MethodData<'g> {
    graph.add_method(MethodData::new(
        ty,
        name,
        MethodSignature::new(true, parameters, return_type),
        MethodAttributes::PUBLIC,
    ))
}

pub fn ldc<'g>(value: i32) -> Instruction<'g> {
    Instruction::new(Opcode::LdcI4, Operand::Int32(value)).unwrap()
}

pub fn opcodes(instructions: &InstructionSequence<'_>) -> Vec<Opcode> {
    instructions
        .iter()
        .map(|node| node.instruction.opcode)
        .collect()
}
