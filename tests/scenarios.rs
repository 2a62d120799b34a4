mod common;

use cilweave::cil::*;
use common::*;

#[test]
fn if_block_encodes_short_conditional_branch() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let ty = graph.add_type(TypeData::new("Demo", "Program", false));
    let method = static_method(&graph, ty, "Run", vec![], None);

    let mut body = MethodBody::new(method);
    let mut writer = Writer::new(&mut body);
    writer
        .load_bool(true)
        .unwrap()
        .begin_if()
        .unwrap()
        .load_int(42)
        .unwrap()
        .end()
        .unwrap();
    writer.finish().unwrap();

    let mut tokens = TokenTable::new();
    let bytes = encode(&body.instructions, &mut tokens).unwrap();
    let decoded = decode(&bytes, &tokens).unwrap();

    let branches: Vec<usize> = decoded
        .iter()
        .enumerate()
        .filter(|(_, node)| node.instruction.opcode.is_branch())
        .map(|(idx, _)| idx)
        .collect();
    assert_eq!(branches.len(), 1);

    let branch = &decoded.get(branches[0]).unwrap().instruction;
    assert_eq!(branch.opcode, Opcode::BrfalseS);

    let constant = decoded
        .iter()
        .position(|node| node.instruction.operand == Operand::Int32(42))
        .unwrap();
    let target = decoded.position(branch.targets()[0]).unwrap();
    assert_eq!(target, constant + 1);
}

#[test]
fn splice_substitutes_missing_argument() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("Demo", "Guards", false));

    let donor_method = static_method(
        &graph,
        ty,
        "Add",
        vec![core.int32, core.int32],
        Some(core.int32),
    );
    let mut donor = MethodBody::new(donor_method);
    donor
        .instructions
        .push(Instruction::new(Opcode::Ldarg, Operand::Argument(0)).unwrap());
    donor
        .instructions
        .push(Instruction::new(Opcode::Ldarg, Operand::Argument(1)).unwrap());
    donor.instructions.push(Instruction::simple(Opcode::Add).unwrap());
    donor.instructions.push(Instruction::simple(Opcode::Ret).unwrap());

    let target_method = static_method(&graph, ty, "Target", vec![core.int32], Some(core.int32));
    let mut target = MethodBody::new(target_method);
    target.add_local(core.string);

    let substitute: &mut Transform<'_, '_> = &mut |insn| match insn.operand {
        Operand::Argument(1) => Some(vec![ldc(7)]),
        _ => None,
    };
    let result = splice(&donor, &mut target, 0, Some(substitute)).unwrap();

    assert_eq!(result.inserted.len(), 4);
    assert_eq!(result.first_local, 1);
    assert_eq!(target.locals.len(), 1);
    let operands: Vec<Operand<'_>> = target
        .instructions
        .iter()
        .map(|node| node.instruction.operand.clone())
        .collect();
    assert_eq!(
        operands,
        vec![
            Operand::Argument(0),
            Operand::Int32(7),
            Operand::None,
            Operand::None
        ]
    );
    assert!(target.instructions.iter().all(|node| match node.instruction.operand {
        Operand::Argument(idx) => (idx as usize) < target_method.signature.argument_count(),
        _ => true,
    }));

    // Without the substitution, the second argument has nowhere to go
    let mut untouched = MethodBody::new(target_method);
    assert!(matches!(
        splice(&donor, &mut untouched, 0, None),
        Err(Error::ShapeMismatch(_))
    ));
    assert!(untouched.instructions.is_empty());
}

#[test]
fn end_without_block_is_rejected() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let ty = graph.add_type(TypeData::new("Demo", "Program", false));
    let method = static_method(&graph, ty, "Run", vec![], None);

    let mut body = MethodBody::new(method);
    let mut writer = Writer::new(&mut body);
    writer.load_int(1).unwrap().emit(Opcode::Pop).unwrap();
    let before = writer.instructions().clone();

    assert!(matches!(
        writer.end(),
        Err(Error::UnbalancedStructure { open_blocks: 0 })
    ));
    assert!(writer.instructions().structurally_eq(&before));
    assert_eq!(writer.position(), 2);
}
