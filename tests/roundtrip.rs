mod common;

use cilweave::cil::*;
use common::*;

#[test]
fn hand_built_body_survives_encode_and_decode() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("App", "Counter", false));
    let count = graph.add_field(FieldData::new(
        ty,
        "count",
        core.int32,
        FieldAttributes::PRIVATE | FieldAttributes::STATIC,
    ));
    let describe = static_method(&graph, ty, "Describe", vec![core.int32], Some(core.string));
    let call_site = graph.add_call_site(CallSiteData {
        signature: MethodSignature::new(false, vec![core.double], None),
    });
    let method = static_method(&graph, ty, "Run", vec![core.int32], Some(core.string));

    let mut body = MethodBody::new(method);
    let scratch = body.add_local(core.int64);
    let mut writer = Writer::new(&mut body);
    writer
        .load_arg(0)
        .unwrap()
        .emit_with(Opcode::Switch, Operand::Switch(vec![]))
        .unwrap();
    let switch = writer.last_emitted().unwrap();
    writer
        .load_field(count)
        .unwrap()
        .load_int(-1)
        .unwrap()
        .emit(Opcode::Add)
        .unwrap()
        .store_field(count)
        .unwrap();
    let first_case = writer.last_emitted().unwrap();
    writer
        .load_long(1 << 40)
        .unwrap()
        .store_local(scratch)
        .unwrap()
        .load_double(2.5)
        .unwrap()
        .load_float(0.5)
        .unwrap()
        .emit(Opcode::ConvR8)
        .unwrap()
        .emit(Opcode::Add)
        .unwrap()
        .emit(Opcode::Ldnull)
        .unwrap()
        .emit_with(Opcode::Calli, Operand::CallSite(call_site))
        .unwrap()
        .emit_with(Opcode::Ldtoken, Operand::Token(MemberRef::Type(ty)))
        .unwrap()
        .emit(Opcode::Pop)
        .unwrap()
        .load_arg(0)
        .unwrap()
        .begin_unless()
        .unwrap()
        .load_string("zero")
        .unwrap()
        .return_()
        .unwrap()
        .end()
        .unwrap();
    let second_case = writer.last_emitted().unwrap();
    writer
        .load_arg(0)
        .unwrap()
        .call(describe)
        .unwrap()
        .return_()
        .unwrap();
    writer
        .replace(
            switch,
            vec![Instruction::new(Opcode::Switch, Operand::Switch(vec![first_case, second_case]))
                .unwrap()],
        )
        .unwrap();
    writer.finish().unwrap();

    let mut tokens = TokenTable::new();
    let bytes = encode(&body.instructions, &mut tokens).unwrap();
    assert_eq!(bytes.len(), body.instructions.byte_len());

    let decoded = decode(&bytes, &tokens).unwrap();
    assert!(decoded.structurally_eq(&body.instructions));
    assert_eq!(opcodes(&decoded), opcodes(&body.instructions));

    // Decoded offsets match a fresh layout of the original
    let mut original = body.instructions.clone();
    original.compute_offsets();
    let expected: Vec<_> = original.iter().map(|node| node.offset).collect();
    let actual: Vec<_> = decoded.iter().map(|node| node.offset).collect();
    assert_eq!(actual, expected);

    // Encoding is stable
    let again = encode(&decoded, &mut tokens).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn long_forms_of_macro_opcodes_are_normalized() {
    init_logging();
    let tokens = TokenTable::new();

    // ldarg.s 1; ldloc 2 (wide); ldc.i4 5 (long form); stloc.s 0; ret
    let verbose = [
        0x0E, 0x01, 0xFE, 0x0C, 0x02, 0x00, 0x20, 0x05, 0x00, 0x00, 0x00, 0x13, 0x00, 0x2A,
    ];
    let decoded = decode(&verbose, &tokens).unwrap();
    assert_eq!(
        opcodes(&decoded),
        vec![
            Opcode::Ldarg,
            Opcode::Ldloc,
            Opcode::LdcI4,
            Opcode::Stloc,
            Opcode::Ret
        ]
    );

    let mut tokens = tokens;
    let compact = encode(&decoded, &mut tokens).unwrap();
    assert_eq!(compact, vec![0x03, 0x08, 0x1B, 0x0A, 0x2A]);
    assert!(decode(&compact, &tokens).unwrap().structurally_eq(&decoded));
}

#[test]
fn shrinking_encodings_keep_branches_on_target() {
    init_logging();
    let tokens = TokenTable::new();

    // 0: ldc.i4 1 (long form, 5 bytes); 5: brtrue.s +6 (-> 13); 7: ldloc 0 (wide, 4 bytes);
    // 11: pop; 12: nop; 13: ret
    let verbose = [
        0x20, 0x01, 0x00, 0x00, 0x00, 0x2D, 0x06, 0xFE, 0x0C, 0x00, 0x00, 0x26, 0x00, 0x2A,
    ];
    let decoded = decode(&verbose, &tokens).unwrap();
    let ret = decoded.id_at(5).unwrap();
    assert_eq!(decoded.get(1).unwrap().instruction.targets(), vec![ret]);

    let mut tokens = tokens;
    let compact = encode(&decoded, &mut tokens).unwrap();
    // ldc.i4.1; brtrue.s +3; ldloc.0; pop; nop; ret
    assert_eq!(compact, vec![0x17, 0x2D, 0x03, 0x06, 0x26, 0x00, 0x2A]);
    assert!(decode(&compact, &tokens).unwrap().structurally_eq(&decoded));
}
