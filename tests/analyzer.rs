//! Analyzer integration tests.
//!
//! These tests drive the public API end to end:
//! 1. Build method bodies with `MethodAssembler`
//! 2. Configure an `Analyzer` with factories
//! 3. Check frames, reachability and return values of the fixed point

use stackflow::{
    analysis::{Analysis, CfgEdgeKind, PureMethods},
    model::{Instruction, ValueType},
    AbstractValue, Analyzer, Condition, ConstValue, Error, FieldConstants, FieldRef, Frame,
    FrameError, HostError, HostValue, InsnId, JoinSemiLattice, MethodAssembler, MethodBody,
    MethodRef, Result, SlotSize, ValueKind,
};

fn int(v: i32) -> AbstractValue {
    AbstractValue::Constant(ConstValue::Int(v))
}

fn long(v: i64) -> AbstractValue {
    AbstractValue::Constant(ConstValue::Long(v))
}

const UNKNOWN: AbstractValue = AbstractValue::Unresolved(SlotSize::Single);

/// `static int derive(int a, int b)`: one field read and one static call over constants.
fn derive_method() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new("Demo", "derive", "(II)I")?;
    asm.iload(0)
        .iload(1)
        .iadd()
        .istore(2)
        .getstatic("Config", "SEED", "I")
        .iconst(3)
        .invokestatic("Util", "mix", "(II)I")
        .ireturn();
    asm.finish()
}

fn mix() -> Result<PureMethods> {
    Ok(PureMethods::new().with(MethodRef::new("Util", "mix", "(II)I")?, |args| {
        match args {
            [ConstValue::Int(a), ConstValue::Int(b)] => {
                Some(ConstValue::Int(a.wrapping_mul(31).wrapping_add(*b)))
            }
            _ => None,
        }
    }))
}

/// Returns `true` if every value known in `coarse` is known identically in `precise`.
fn refines(precise: &Frame, coarse: &Frame) -> bool {
    let stack_ok = precise.stack().len() == coarse.stack().len()
        && precise
            .stack()
            .iter()
            .zip(coarse.stack())
            .all(|(p, c)| c.is_unresolved() || p == c);
    let locals_ok = precise
        .locals()
        .iter()
        .zip(coarse.locals())
        .all(|(p, c)| match (p, c) {
            (_, None) => true,
            (Some(p), Some(c)) => c.is_unresolved() || p == c,
            (None, Some(_)) => false,
        });
    stack_ok && locals_ok
}

#[test_log::test]
fn test_lattice_laws() -> Result<()> {
    let singles = [
        UNKNOWN,
        int(0),
        int(-1),
        AbstractValue::Constant(ConstValue::Float(f32::NAN)),
        AbstractValue::Constant(ConstValue::String("s".into())),
        AbstractValue::Constant(ConstValue::Null),
        AbstractValue::Constant(ConstValue::Type("java/lang/Object".into())),
        AbstractValue::reference("Demo"),
    ];
    let doubles = [
        AbstractValue::Unresolved(SlotSize::Double),
        long(1),
        long(2),
        AbstractValue::Constant(ConstValue::Double(0.5)),
    ];

    for values in [&singles[..], &doubles[..]] {
        let top = AbstractValue::Unresolved(values[0].size());
        for a in values {
            assert_eq!(&a.join(a)?, a);
            assert_eq!(a.join(&top)?, top);
            for b in values {
                assert_eq!(a.join(b)?, b.join(a)?);
                for c in values {
                    assert_eq!(a.join(b)?.join(c)?, a.join(&b.join(c)?)?);
                }
            }
        }
    }

    assert!(matches!(
        singles[1].join(&doubles[1]),
        Err(Error::SizeMismatch { left: 1, right: 2 })
    ));
    assert!(matches!(
        AbstractValue::unresolved_slots(3),
        Err(Error::InvalidSlotSize(3))
    ));
    Ok(())
}

#[test_log::test]
fn test_factories_resolve_return_value() -> Result<()> {
    let seed = FieldRef::new("Config", "SEED", "I")?;
    let analyzer = Analyzer::builder()
        .static_get(FieldConstants::new().with(seed, ConstValue::Int(5)))
        .static_invoke(mix()?)
        .build()?;

    let analysis = analyzer.analyze(&derive_method()?)?;

    assert_eq!(analysis.return_value(), Some(&int(5 * 31 + 3)));
    assert_eq!(analysis.frame(InsnId::new(7)).and_then(Frame::top), Some(&int(158)));
    // The parameters stay unknown
    assert_eq!(analysis.frame(InsnId::new(4)).unwrap().local(2), Ok(&UNKNOWN));
    assert!(analysis.unreachable().is_empty());
    Ok(())
}

#[test_log::test]
fn test_no_factories_leave_results_unresolved() -> Result<()> {
    let analysis = Analyzer::new().analyze(&derive_method()?)?;

    assert_eq!(analysis.frame(InsnId::new(5)).unwrap().stack(), &[UNKNOWN]);
    assert_eq!(analysis.frame(InsnId::new(7)).unwrap().stack(), &[UNKNOWN]);
    assert_eq!(analysis.return_value(), Some(&UNKNOWN));
    assert!(analysis.resolved_failures().is_empty());
    Ok(())
}

#[test_log::test]
fn test_more_precise_factories_never_lose_precision() -> Result<()> {
    // static int f(int p) {
    //     int x = A.X; int y = B.Y;
    //     int r = (p == 0) ? Util.mix(x, 1) : Util.mix(x, y);
    //     return r + y;
    // }
    let mut asm = MethodAssembler::new("Demo", "f", "(I)I")?;
    asm.getstatic("A", "X", "I")
        .istore(1)
        .getstatic("B", "Y", "I")
        .istore(2)
        .iload(0)
        .if_cond(Condition::Ne, "other")
        .iload(1)
        .iconst(1)
        .invokestatic("Util", "mix", "(II)I")
        .goto("join")
        .label("other")
        .iload(1)
        .iload(2)
        .invokestatic("Util", "mix", "(II)I")
        .label("join")
        .iload(2)
        .iadd()
        .ireturn();
    let method = asm.finish()?;

    let x = FieldRef::new("A", "X", "I")?;
    let y = FieldRef::new("B", "Y", "I")?;
    let coarse = Analyzer::builder()
        .static_get(FieldConstants::new().with(x.clone(), ConstValue::Int(2)))
        .static_invoke(mix()?)
        .build()?
        .analyze(&method)?;
    let precise = Analyzer::builder()
        .static_get(
            FieldConstants::new()
                .with(x, ConstValue::Int(2))
                .with(y, ConstValue::Int(1)),
        )
        .static_invoke(mix()?)
        .build()?
        .analyze(&method)?;

    for index in 0..method.len() {
        let insn = InsnId::new(index);
        match (precise.frame(insn), coarse.frame(insn)) {
            (Some(p), Some(c)) => assert!(refines(p, c), "{insn}: {p} does not refine {c}"),
            (None, None) => {}
            _ => panic!("reachability differs at {insn}"),
        }
    }
    // Both branches compute mix(2, 1) once y is known
    assert_eq!(precise.return_value(), Some(&int(2 * 31 + 1 + 1)));
    assert_eq!(coarse.return_value(), Some(&UNKNOWN));
    Ok(())
}

#[test_log::test]
fn test_factory_constants_merge_with_simulated_results() -> Result<()> {
    // static int pick(int p) { return p == 0 ? A.a(1) : B.b(1); }
    let mut asm = MethodAssembler::new("Demo", "pick", "(I)I")?;
    asm.iload(0)
        .if_cond(Condition::Ne, "other")
        .iconst(1)
        .invokestatic("A", "a", "(I)I")
        .goto("join")
        .label("other")
        .iconst(1)
        .invokestatic("B", "b", "(I)I")
        .label("join")
        .ireturn();
    let method = asm.finish()?;

    let host = |_: &MethodRef, _: &[HostValue]| -> std::result::Result<Option<HostValue>, HostError> {
        Ok(Some(HostValue::Const(ConstValue::Int(3))))
    };
    let coarse = Analyzer::builder()
        .value_kind(ValueKind::Simulated)
        .host(host)
        .build()?
        .analyze(&method)?;
    let precise = Analyzer::builder()
        .value_kind(ValueKind::Simulated)
        .host(host)
        .static_invoke(
            PureMethods::new().with(MethodRef::new("B", "b", "(I)I")?, |_| Some(ConstValue::Int(3))),
        )
        .build()?
        .analyze(&method)?;

    for index in 0..method.len() {
        let insn = InsnId::new(index);
        let (p, c) = (precise.frame(insn).unwrap(), coarse.frame(insn).unwrap());
        assert!(refines(p, c), "{insn}: {p} does not refine {c}");
    }
    assert_eq!(coarse.return_value(), Some(&int(3)));
    assert_eq!(precise.return_value(), Some(&int(3)));
    Ok(())
}

#[test_log::test]
fn test_every_instruction_is_framed_or_unreachable() -> Result<()> {
    // Nested loops, a switch and a dead block
    let mut asm = MethodAssembler::new("Demo", "nested", "(I)I")?;
    asm.iconst(0)
        .istore(1)
        .label("outer")
        .iconst(0)
        .istore(2)
        .label("inner")
        .iinc(2, 1)
        .iload(2)
        .iload(0)
        .if_cmp(ValueType::Int, Condition::Lt, "inner")
        .iinc(1, 1)
        .iload(1)
        .switch("done", &[(1, "outer"), (2, "outer")])
        .label("dead")
        .iconst(9)
        .goto("dead")
        .label("done")
        .iload(1)
        .ireturn();
    let method = asm.finish()?;
    let analysis = Analyzer::new().analyze(&method)?;

    let dead = analysis.unreachable().to_vec();
    assert_eq!(dead, analysis.cfg().unreachable());
    assert_eq!(dead.len(), 2);
    for index in 0..method.len() {
        let insn = InsnId::new(index);
        assert_ne!(analysis.is_reachable(insn), dead.contains(&insn));
    }
    assert!(analysis.iterations() >= method.len() - dead.len());
    assert_eq!(analysis.return_value(), Some(&UNKNOWN));
    Ok(())
}

#[test_log::test]
fn test_exception_handlers_receive_caught_reference() -> Result<()> {
    let mut asm = MethodAssembler::new("Demo", "read", "()I")?;
    asm.try_catch("start", "end", "io", Some("java/io/IOException"))
        .try_catch("start", "end", "any", None)
        .iconst(7)
        .istore(0)
        .label("start")
        .invokestatic("Io", "read", "()I")
        .istore(0)
        .label("end")
        .iload(0)
        .ireturn()
        .label("io")
        .astore(1)
        .iload(0)
        .ireturn()
        .label("any")
        .throw();
    let method = asm.finish()?;
    let analysis = Analyzer::new().analyze(&method)?;

    let io = analysis.frame(InsnId::new(6)).unwrap();
    assert_eq!(io.stack(), &[AbstractValue::reference("java/io/IOException")]);
    assert_eq!(io.local(0), Ok(&int(7)));

    let any = analysis.frame(InsnId::new(9)).unwrap();
    assert_eq!(any.stack(), &[AbstractValue::reference("java/lang/Throwable")]);

    assert!(analysis
        .cfg()
        .exception_edges(InsnId::new(2))
        .iter()
        .all(|edge| matches!(edge.kind(), CfgEdgeKind::Exception { .. })));
    assert_eq!(analysis.return_value(), Some(&UNKNOWN));
    Ok(())
}

#[test_log::test]
fn test_wide_values() -> Result<()> {
    let mut asm = MethodAssembler::new("Demo", "twice", "(JD)J")?;
    asm.lconst(5)
        .dup2()
        .ladd()
        .lstore(4)
        .lload(4)
        .return_value(ValueType::Long);
    let method = asm.finish()?;
    let analysis = Analyzer::new().analyze(&method)?;

    let entry = analysis.frame(InsnId::new(0)).unwrap();
    assert_eq!(entry.local(0), Ok(&AbstractValue::Unresolved(SlotSize::Double)));
    assert_eq!(entry.local(1), Err(FrameError::EmptyLocal(1)));
    assert_eq!(entry.local(2), Ok(&AbstractValue::Unresolved(SlotSize::Double)));

    let doubled = analysis.frame(InsnId::new(2)).unwrap();
    assert_eq!(doubled.stack(), &[long(5), long(5)]);
    assert_eq!(doubled.stack_slots(), 4);
    assert_eq!(analysis.return_value(), Some(&long(10)));

    let mut limited = method.clone();
    limited.max_stack = Some(3);
    let err = Analyzer::new().analyze(&limited).unwrap_err();
    assert!(matches!(
        err,
        Error::Frame {
            source: FrameError::StackOverflow { max: 3 },
            ..
        }
    ));
    assert_eq!(err.insn(), Some(InsnId::new(1)));
    Ok(())
}

#[test_log::test]
fn test_malformed_input_is_fatal() -> Result<()> {
    let mut asm = MethodAssembler::new("Demo", "underflow", "()V")?;
    asm.iadd().return_void();
    let err = Analyzer::new().analyze(&asm.finish()?).unwrap_err();
    assert!(matches!(
        err,
        Error::Frame {
            source: FrameError::StackUnderflow,
            ..
        }
    ));
    assert!(!err.is_resolvable());

    let mut asm = MethodAssembler::new("Demo", "falls", "()V")?;
    asm.nop();
    let err = Analyzer::new().analyze(&asm.finish()?).unwrap_err();
    assert!(matches!(err, Error::MalformedGraph { .. }));

    let mut body = MethodBody::new(
        "Demo",
        "jump",
        "()V",
        stackflow::MethodAccess::STATIC,
        0,
        vec![Instruction::Goto(InsnId::new(5))],
    )?;
    assert!(matches!(
        Analyzer::new().analyze(&body),
        Err(Error::MalformedGraph { .. })
    ));
    body.max_locals = 0;
    body.descriptor = stackflow::model::MethodDescriptor::parse("(I)V")?;
    assert!(matches!(
        Analyzer::new().analyze(&body),
        Err(Error::Malformed { .. })
    ));
    Ok(())
}

#[test_log::test]
fn test_analyze_all_keeps_order() -> Result<()> {
    let mut broken = MethodAssembler::new("Demo", "broken", "()V")?;
    broken.pop().return_void();
    let methods = vec![derive_method()?, broken.finish()?, derive_method()?];

    let analyzer = Analyzer::builder().static_invoke(mix()?).build()?;
    let results: Vec<Result<Analysis>> = analyzer.analyze_all(&methods);

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().err().and_then(Error::insn), Some(InsnId::new(0)));
    assert_eq!(
        results[0].as_ref().ok().and_then(Analysis::return_value),
        results[2].as_ref().ok().and_then(Analysis::return_value)
    );
    Ok(())
}
