mod common;

use cilweave::cil::{self, *};
use cilweave::weave::{self, *};
use common::*;

/// Throws if a reference parameter is null
struct NotNull<'g> {
    exception_ctor: &'g MethodData<'g>,
}

impl<'g> Marker<'g> for NotNull<'g> {
    fn name(&self) -> &str {
        "NotNull"
    }

    fn applies_to(&self) -> &[ElementKind] {
        &[ElementKind::Parameter]
    }

    fn weave(
        &self,
        element: &Element<'g>,
        cx: &mut WeavingContext<'g>,
    ) -> Result<(), weave::Error> {
        let (method, index) = match element {
            Element::Parameter { method, index } => (*method, *index),
            _ => return Err(weave::Error::MarkerFailed(String::from("not a parameter"))),
        };
        let slot = (index + method.signature.has_this as usize) as u16;
        let message = format!("parameter {} is null", index);

        let mut writer = cx.writer(method)?;
        writer
            .goto_start()?
            .load_arg(slot)?
            .load_null()?
            .emit(Opcode::Ceq)?
            .begin_if()?
            .throw_new(self.exception_ctor, &message)?
            .end()?;
        writer.finish()?;
        Ok(())
    }
}

/// Counts entries into a method, instrumenting each method at most once
struct CountEntries<'g> {
    counter: &'g FieldData<'g>,
}

impl<'g> Marker<'g> for CountEntries<'g> {
    fn name(&self) -> &str {
        "CountEntries"
    }

    fn applies_to(&self) -> &[ElementKind] {
        &[ElementKind::Method, ElementKind::Parameter]
    }

    fn weave(
        &self,
        element: &Element<'g>,
        cx: &mut WeavingContext<'g>,
    ) -> Result<(), weave::Error> {
        let method = match element.method() {
            Some(method) => method,
            None => return Ok(()),
        };
        if cx.is_rewritten(method) {
            return Ok(());
        }
        let mut writer = cx.writer(method)?;
        writer
            .goto_start()?
            .load_field(self.counter)?
            .load_int(1)?
            .emit(Opcode::Add)?
            .store_field(self.counter)?;
        writer.finish()?;
        Ok(())
    }
}

/// Edits, then gives up
struct Broken;

impl<'g> Marker<'g> for Broken {
    fn name(&self) -> &str {
        "Broken"
    }

    fn applies_to(&self) -> &[ElementKind] {
        ElementKind::ALL
    }

    fn weave(
        &self,
        element: &Element<'g>,
        cx: &mut WeavingContext<'g>,
    ) -> Result<(), weave::Error> {
        if let Some(method) = element.method() {
            cx.writer(method)?.load_int(0)?.emit(Opcode::Pop)?;
        }
        Err(weave::Error::MarkerFailed(String::from("gave up")))
    }
}

/// Leaves a branch without target behind
struct Sloppy;

impl<'g> Marker<'g> for Sloppy {
    fn name(&self) -> &str {
        "Sloppy"
    }

    fn applies_to(&self) -> &[ElementKind] {
        &[ElementKind::Method]
    }

    fn weave(
        &self,
        element: &Element<'g>,
        cx: &mut WeavingContext<'g>,
    ) -> Result<(), weave::Error> {
        if let Element::Method(method) = element {
            cx.writer(*method)?
                .emit_with(Opcode::Br, Operand::Branch(None))?;
        }
        Ok(())
    }
}

/// Opens a block and never closes it
struct Forgetful;

impl<'g> Marker<'g> for Forgetful {
    fn name(&self) -> &str {
        "Forgetful"
    }

    fn applies_to(&self) -> &[ElementKind] {
        &[ElementKind::Method]
    }

    fn weave(
        &self,
        element: &Element<'g>,
        cx: &mut WeavingContext<'g>,
    ) -> Result<(), weave::Error> {
        if let Element::Method(method) = element {
            cx.writer(*method)?
                .goto_start()?
                .load_int(1)?
                .begin_if()?
                .load_int(2)?
                .emit(Opcode::Pop)?;
        }
        Ok(())
    }
}

fn ret_body<'g>(method: &'g MethodData<'g>) -> MethodBody<'g> {
    let mut body = MethodBody::new(method);
    body.instructions.push(Instruction::simple(Opcode::Ret).unwrap());
    body
}

#[test]
fn guards_are_inserted_at_the_start() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("App", "Greeter", false));
    let greet = instance_method(&graph, ty, "Greet", vec![core.string], None);
    let not_null = NotNull {
        exception_ctor: core.exception_ctor,
    };

    let mut weaver = Weaver::new(Settings::default());
    weaver.add_body(ret_body(greet));
    let report = weaver
        .run(vec![Target::new(
            Element::Parameter {
                method: greet,
                index: 0,
            },
            vec![&not_null],
        )])
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.woven, vec![String::from("App.Greeter::Greet (parameter 0)")]);

    let body = weaver.context().body(greet).unwrap();
    assert_eq!(
        opcodes(&body.instructions),
        vec![
            Opcode::Ldarg,
            Opcode::Ldnull,
            Opcode::Ceq,
            Opcode::BrfalseS,
            Opcode::Ldstr,
            Opcode::Newobj,
            Opcode::Throw,
            Opcode::Nop,
            Opcode::Ret,
        ]
    );
    assert_eq!(body.instructions.get(0).unwrap().instruction.operand, Operand::Argument(1));
    assert!(weaver.context().is_rewritten(greet));

    let mut tokens = TokenTable::new();
    let bytes = encode(&body.instructions, &mut tokens).unwrap();
    assert!(decode(&bytes, &tokens)
        .unwrap()
        .structurally_eq(&body.instructions));
}

#[test]
fn failed_member_is_rolled_back_and_reported() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("App", "Store", false));
    let save = static_method(&graph, ty, "Save", vec![core.string], None);
    let load = static_method(&graph, ty, "Load", vec![core.string], None);
    let not_null = NotNull {
        exception_ctor: core.exception_ctor,
    };

    let mut weaver = Weaver::new(Settings::default());
    weaver.add_body(ret_body(save)).add_body(ret_body(load));
    let report = weaver
        .run(vec![
            Target::new(
                Element::Parameter {
                    method: save,
                    index: 0,
                },
                vec![&not_null, &Broken],
            ),
            Target::new(
                Element::Parameter {
                    method: load,
                    index: 0,
                },
                vec![&not_null],
            ),
        ])
        .unwrap();

    assert_eq!(report.woven, vec![String::from("App.Store::Load (parameter 0)")]);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.member, "App.Store::Save (parameter 0)");
    assert!(matches!(
        &failure.error,
        weave::Error::WhileProcessing { marker, .. } if marker == "Broken"
    ));
    assert!(matches!(failure.error.root_cause(), weave::Error::MarkerFailed(_)));
    assert!(failure
        .error
        .to_string()
        .starts_with("while processing App.Store::Save (parameter 0)"));

    // The guard added by the first marker went away with the failure
    let cx = weaver.context();
    assert_eq!(opcodes(&cx.body(save).unwrap().instructions), vec![Opcode::Ret]);
    assert!(!cx.is_rewritten(save));
    assert_eq!(cx.body(load).unwrap().instructions.len(), 9);
}

#[test]
fn markers_are_checked_against_element_kinds() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("", "T", false));
    let method = static_method(&graph, ty, "M", vec![], None);
    let not_null = NotNull {
        exception_ctor: core.exception_ctor,
    };

    let mut weaver = Weaver::new(Settings::default());
    weaver.add_body(ret_body(method));
    let report = weaver
        .run(vec![Target::new(Element::Method(method), vec![&not_null])])
        .unwrap();

    assert!(matches!(
        report.failures[0].error.root_cause(),
        weave::Error::NotApplicable {
            kind: ElementKind::Method,
            ..
        }
    ));
}

#[test]
fn stop_on_first_failure_aborts_the_run() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("", "T", false));
    let first = static_method(&graph, ty, "First", vec![], None);
    let second = static_method(&graph, ty, "Second", vec![], None);
    let counter = graph.add_field(FieldData::new(
        ty,
        "calls",
        core.int32,
        FieldAttributes::STATIC,
    ));
    let count = CountEntries { counter };

    let settings = Settings {
        stop_on_first_failure: true,
        ..Settings::default()
    };
    let mut weaver = Weaver::new(settings);
    weaver.add_body(ret_body(first)).add_body(ret_body(second));
    let result = weaver.run(vec![
        Target::new(Element::Method(first), vec![&Broken]),
        Target::new(Element::Method(second), vec![&count]),
    ]);

    assert!(matches!(result, Err(weave::Error::WhileProcessing { .. })));
    assert_eq!(weaver.context().body(first).unwrap().instructions.len(), 1);
    assert_eq!(weaver.context().body(second).unwrap().instructions.len(), 1);
}

#[test]
fn registry_prevents_rewriting_twice_within_a_run() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let core = graph.insert_core_types();
    let ty = graph.add_type(TypeData::new("App", "Math", false));
    let method = static_method(&graph, ty, "Sum", vec![core.int32, core.int32], None);
    let counter = graph.add_field(FieldData::new(
        ty,
        "calls",
        core.int32,
        FieldAttributes::STATIC,
    ));
    let count = CountEntries { counter };
    let targets = || {
        vec![
            Target::new(Element::Parameter { method, index: 0 }, vec![&count as &dyn Marker<'_>]),
            Target::new(Element::Parameter { method, index: 1 }, vec![&count]),
        ]
    };

    let mut weaver = Weaver::new(Settings::default());
    weaver.add_body(ret_body(method));
    let report = weaver.run(targets()).unwrap();
    assert_eq!(report.woven.len(), 2);
    assert_eq!(weaver.context().body(method).unwrap().instructions.len(), 5);
    assert_eq!(weaver.context().rewritten().count(), 1);

    // A new run starts with an empty registry
    let bodies = weaver.into_context().into_bodies();
    let mut next = Weaver::new(Settings::default());
    for body in bodies {
        next.add_body(body);
    }
    assert!(!next.context().is_rewritten(method));
    next.run(targets()).unwrap();
    assert_eq!(next.context().body(method).unwrap().instructions.len(), 9);
}

#[test]
fn unresolved_branches_fail_the_member() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let ty = graph.add_type(TypeData::new("", "T", false));
    let method = static_method(&graph, ty, "M", vec![], None);

    let mut weaver = Weaver::new(Settings::default());
    weaver.add_body(ret_body(method));
    let report = weaver
        .run(vec![Target::new(Element::Method(method), vec![&Sloppy])])
        .unwrap();

    assert!(matches!(
        report.failures[0].error.root_cause(),
        weave::Error::Editing(cil::Error::UnresolvedBranch(_))
    ));
    assert_eq!(weaver.context().body(method).unwrap().instructions.len(), 1);
}

#[test]
fn blocks_left_open_fail_the_member() {
    init_logging();
    let arenas = MetadataArenas::new();
    let graph = MetadataGraph::new(&arenas);
    let ty = graph.add_type(TypeData::new("A", "B", false));
    let method = static_method(&graph, ty, "M", vec![], None);

    let mut weaver = Weaver::new(Settings::default());
    weaver.add_body(ret_body(method));
    let report = weaver
        .run(vec![Target::new(Element::Method(method), vec![&Forgetful])])
        .unwrap();

    assert!(report.woven.is_empty());
    assert!(matches!(
        report.failures[0].error.root_cause(),
        weave::Error::Editing(cil::Error::UnbalancedStructure { open_blocks: 1 })
    ));
    let body = weaver.context().body(method).unwrap();
    assert_eq!(opcodes(&body.instructions), vec![Opcode::Ret]);
    assert_eq!(body.open_blocks(), 0);
    assert!(!weaver.context().is_rewritten(method));
}
