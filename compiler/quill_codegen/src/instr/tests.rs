use quill_bound::{BinaryOp, LocalId, StringInterner, Ty};

use super::*;

#[test]
fn id_basics() {
    assert_eq!(Label::new(3).raw(), 3);
    assert_eq!(Label::new(3).index(), 3);
    assert_eq!(TempSlot::new(5).index(), 5);
    assert!(Label::new(0) < Label::new(1));
}

#[test]
fn stack_effects() {
    assert_eq!(Instr::ConstInt(1).stack_effect(), (0, 1));
    assert_eq!(Instr::StoreLocal(LocalId::new(0)).stack_effect(), (1, 0));
    assert_eq!(Instr::Binary(BinaryOp::Add).stack_effect(), (2, 1));
    assert_eq!(Instr::Dup.stack_effect(), (1, 2));
    assert_eq!(
        Instr::Convert {
            from: Ty::Int,
            to: Ty::Value
        }
        .stack_effect(),
        (1, 1)
    );
    assert_eq!(Instr::Return { with_value: true }.stack_effect(), (1, 0));
    assert_eq!(Instr::Return { with_value: false }.stack_effect(), (0, 0));
    assert_eq!(Instr::MarkLabel(Label::new(0)).stack_effect(), (0, 0));
}

#[test]
fn call_effect_follows_runtime_signature() {
    for rt in [
        RuntimeFn::DeclareFunction,
        RuntimeFn::DefineConstant,
        RuntimeFn::ArraySet,
        RuntimeFn::StaticHolder,
        RuntimeFn::SetGeneratorCurrent,
    ] {
        let call = Instr::Call {
            callee: Callee::Runtime(rt),
            argc: rt.arity(),
            returns: rt.returns_value(),
        };
        assert_eq!(
            call.stack_effect(),
            (rt.arity() as usize, usize::from(rt.returns_value()))
        );
    }
}

#[test]
fn flow_enders() {
    assert!(Instr::Branch(Label::new(0)).ends_flow());
    assert!(Instr::Throw.ends_flow());
    assert!(Instr::Return { with_value: false }.ends_flow());
    assert!(Instr::Leave(Label::new(1)).ends_flow());
    assert!(!Instr::BranchIf {
        when: true,
        target: Label::new(0)
    }
    .ends_flow());
    assert!(!Instr::EnterTry {
        handler: Label::new(0)
    }
    .ends_flow());
}

#[test]
fn branch_targets_of_switch() {
    let switch = Instr::Switch {
        cases: vec![(1, Label::new(4)), (2, Label::new(5))],
        default: Label::new(6),
    };
    assert_eq!(
        switch.branch_targets().as_slice(),
        &[Label::new(4), Label::new(5), Label::new(6)]
    );
    assert!(Instr::Pop.branch_targets().is_empty());
}

#[test]
fn display_resolves_names() {
    let interner = StringInterner::new();
    let greet = interner.intern("greet");
    let call = Instr::Call {
        callee: Callee::Function(greet),
        argc: 1,
        returns: false,
    };
    assert_eq!(call.display(&interner).to_string(), "call greet/1 void");
    assert_eq!(
        Instr::ConstStr(greet).display(&interner).to_string(),
        "const.s \"greet\""
    );
    let switch = Instr::Switch {
        cases: vec![(1, Label::new(2))],
        default: Label::new(0),
    };
    assert_eq!(
        switch.display(&interner).to_string(),
        "switch [1 => L2] else L0"
    );
}
