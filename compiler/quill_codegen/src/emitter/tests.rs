use pretty_assertions::assert_eq;
use quill_bound::{
    BlockId, BoundExpr, BoundStatement, CfgBuilder, ControlFlowGraph, Edge, LocalId, LocalsTable,
    Name, Procedure, ProcedureKind, RefExpr, Span, StaticVarDecl, Ty, VarKind, YieldStmt,
};

use crate::instr::{Instr, RuntimeFn};
use crate::order::{BlockOrder, EmitOrder};
use crate::sink::InstrBuffer;
use crate::test_helpers::{call, l, lower, lower_err, lower_with, make_proc, n, release, rt, t};
use crate::{lower_procedure_into, EmitOptions, LowerError};

fn yield_stmt(index: i32, value: i64) -> BoundStatement {
    BoundStatement::Yield(YieldStmt {
        index,
        value: BoundExpr::int(value),
        key: None,
        is_yield_from: false,
    })
}

fn void_call(func: Name) -> BoundStatement {
    BoundStatement::Expression(BoundExpr::call(func, vec![], Ty::Void))
}

// ── Exit staging ────────────────────────────────────────────────────

#[test]
fn return_value_goes_through_return_temp() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::Return(Some(BoundExpr::int(5))))
        .goto(start, exit);
    let proc = make_proc(Ty::Int, LocalsTable::new(), builder);

    let body = lower(&proc);
    assert_eq!(
        body.instrs,
        vec![
            Instr::ConstInt(5),
            Instr::AllocTemp {
                slot: t(0),
                ty: Ty::Int
            },
            Instr::StoreTemp(t(0)),
            Instr::Branch(l(1)),
            // Exit's own label: nothing branches to it, so the default
            // return after it is dead and dropped.
            Instr::MarkLabel(l(0)),
            Instr::MarkLabel(l(1)),
            Instr::LoadTemp(t(0)),
            Instr::Return { with_value: true },
            Instr::FreeTemp(t(0)),
        ]
    );
    assert_eq!(body.temps, vec![Ty::Int]);
    assert_eq!(body.label_count, 2);
}

#[test]
fn returns_in_both_branches_share_one_temp() {
    let mut locals = LocalsTable::new();
    let flag = locals.declare(n(10), Ty::Bool, VarKind::Parameter);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let then_b = builder.new_block();
    let else_b = builder.new_block();
    builder
        .set_edge(
            start,
            Edge::Conditional {
                condition: BoundExpr::local(flag, Ty::Bool),
                on_true: then_b,
                on_false: else_b,
            },
        )
        .push(then_b, BoundStatement::Return(Some(BoundExpr::int(1))))
        .goto(then_b, exit)
        .push(else_b, BoundStatement::Return(Some(BoundExpr::int(2))))
        .goto(else_b, exit);
    let proc = make_proc(Ty::Int, locals, builder);

    let body = lower(&proc);
    assert_eq!(
        body.instrs,
        vec![
            Instr::LoadLocal(flag),
            Instr::BranchIf {
                when: false,
                target: l(1)
            },
            Instr::MarkLabel(l(0)),
            Instr::ConstInt(1),
            Instr::AllocTemp {
                slot: t(0),
                ty: Ty::Int
            },
            Instr::StoreTemp(t(0)),
            Instr::Branch(l(3)),
            Instr::MarkLabel(l(1)),
            Instr::ConstInt(2),
            Instr::StoreTemp(t(0)),
            Instr::Branch(l(3)),
            Instr::MarkLabel(l(2)),
            Instr::MarkLabel(l(3)),
            Instr::LoadTemp(t(0)),
            Instr::Return { with_value: true },
            Instr::FreeTemp(t(0)),
        ]
    );
    let loads = body
        .instrs
        .iter()
        .filter(|i| matches!(i, Instr::LoadTemp(_)))
        .count();
    assert_eq!(loads, 1);
}

#[test]
fn falling_into_exit_returns_default() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder.goto(start, exit);
    let proc = make_proc(Ty::Int, LocalsTable::new(), builder);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::MarkLabel(l(0)),
            Instr::ConstInt(0),
            Instr::Return { with_value: true },
        ]
    );
}

#[test]
fn void_return_branches_to_return_label() {
    let mut locals = LocalsTable::new();
    let flag = locals.declare(n(10), Ty::Bool, VarKind::Parameter);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let early = builder.new_block();
    let late = builder.new_block();
    builder
        .set_edge(
            start,
            Edge::Conditional {
                condition: BoundExpr::local(flag, Ty::Bool),
                on_true: early,
                on_false: late,
            },
        )
        .push(early, BoundStatement::Return(None))
        .goto(early, exit)
        .push(late, void_call(n(20)))
        .goto(late, exit);
    let proc = make_proc(Ty::Void, locals, builder);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::LoadLocal(flag),
            Instr::BranchIf {
                when: false,
                target: l(1)
            },
            Instr::MarkLabel(l(0)),
            Instr::Branch(l(3)),
            Instr::MarkLabel(l(1)),
            call(n(20), 0, false),
            Instr::MarkLabel(l(2)),
            // No return temporary: the return label comes first.
            Instr::MarkLabel(l(3)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn return_after_throw_reads_no_temp() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::Throw(BoundExpr::null()))
        .push(start, BoundStatement::Return(Some(BoundExpr::int(1))))
        .goto(start, exit);
    let proc = make_proc(Ty::Int, LocalsTable::new(), builder);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::ConstNull,
            Instr::Convert {
                from: Ty::Null,
                to: Ty::Value
            },
            Instr::Throw,
            Instr::AllocTemp {
                slot: t(0),
                ty: Ty::Int
            },
            Instr::MarkLabel(l(0)),
            Instr::FreeTemp(t(0)),
        ]
    );
}

// ── Generators ──────────────────────────────────────────────────────

#[test]
fn two_yield_generator() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, yield_stmt(1, 1))
        .push(start, yield_stmt(2, 2))
        .push(start, BoundStatement::Return(None))
        .goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder).generator();

    let body = lower(&proc);
    let publish = |value: i64| {
        [
            Instr::ConstInt(value),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value,
            },
            rt(RuntimeFn::SetGeneratorCurrent),
        ]
    };

    let mut expected = vec![
        Instr::AllocTemp {
            slot: t(0),
            ty: Ty::Int,
        },
        Instr::LoadGeneratorState,
        Instr::StoreTemp(t(0)),
        Instr::ConstInt(-1),
        Instr::StoreGeneratorState,
        Instr::LoadTemp(t(0)),
        Instr::Switch {
            cases: vec![(1, l(1)), (2, l(2))],
            default: l(3),
        },
        Instr::FreeTemp(t(0)),
        Instr::MarkLabel(l(3)),
    ];
    expected.extend(publish(1));
    expected.extend([
        Instr::ConstInt(1),
        Instr::StoreGeneratorState,
        Instr::Return { with_value: false },
        Instr::MarkLabel(l(1)),
    ]);
    expected.extend(publish(2));
    expected.extend([
        Instr::ConstInt(2),
        Instr::StoreGeneratorState,
        Instr::Return { with_value: false },
        Instr::MarkLabel(l(2)),
        Instr::Branch(l(4)),
        Instr::MarkLabel(l(0)),
        Instr::MarkLabel(l(4)),
        Instr::ConstInt(-2),
        Instr::StoreGeneratorState,
        Instr::Return { with_value: false },
    ]);

    assert_eq!(body.instrs, expected);
    assert_eq!(body.resume_points, vec![(1, l(1)), (2, l(2))]);
    assert!(body.is_generator());
}

#[test]
fn generator_return_value_is_recorded() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, yield_stmt(1, 7))
        .push(start, BoundStatement::Return(Some(BoundExpr::int(9))))
        .goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder).generator();

    let body = lower(&proc);
    let tail = &body.instrs[body.instrs.len() - 10..];
    assert_eq!(
        tail,
        &[
            Instr::MarkLabel(l(1)),
            Instr::ConstInt(9),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value
            },
            rt(RuntimeFn::SetGeneratorReturn),
            Instr::Branch(l(3)),
            Instr::MarkLabel(l(0)),
            Instr::MarkLabel(l(3)),
            Instr::ConstInt(-2),
            Instr::StoreGeneratorState,
            Instr::Return { with_value: false },
        ][..]
    );
}

#[test]
fn yield_with_key_and_delegation() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(
            start,
            BoundStatement::Yield(YieldStmt {
                index: 1,
                value: BoundExpr::int(1),
                key: Some(BoundExpr::str(n(30))),
                is_yield_from: false,
            }),
        )
        .push(
            start,
            BoundStatement::Yield(YieldStmt {
                index: 2,
                value: BoundExpr::int(2),
                key: None,
                is_yield_from: true,
            }),
        )
        .goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder).generator();

    let body = lower(&proc);
    let helpers: Vec<&Instr> = body
        .instrs
        .iter()
        .filter(|i| matches!(i, Instr::Call { .. }))
        .collect();
    assert_eq!(
        helpers,
        vec![
            &rt(RuntimeFn::SetGeneratorCurrentWithKey),
            &rt(RuntimeFn::SetGeneratorCurrentDelegated),
        ]
    );
}

#[test]
fn yield_only_block_is_still_emitted() {
    // The resumed block is reachable only through the dispatch table.
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let resumed = builder.new_block();
    builder
        .push(start, BoundStatement::Return(None))
        .goto(start, exit)
        .push(resumed, yield_stmt(1, 3))
        .push(resumed, void_call(n(40)))
        .goto(resumed, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder).generator();

    let body = lower(&proc);
    let resume = body
        .instrs
        .iter()
        .position(|i| *i == Instr::MarkLabel(l(1)))
        .unwrap_or_else(|| panic!("resume label missing: {:?}", body.instrs));
    assert_eq!(body.instrs[resume + 1], call(n(40), 0, false));
    assert_eq!(body.resume_points, vec![(1, l(1))]);
}

#[test]
fn yield_outside_generator_is_rejected() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder.push(start, yield_stmt(1, 1)).goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    assert_eq!(
        lower_err(&proc),
        LowerError::YieldOutsideGenerator { index: 1 }
    );
}

#[test]
fn sparse_yield_indices_are_rejected() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, yield_stmt(1, 1))
        .push(start, yield_stmt(3, 3))
        .goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder).generator();

    assert_eq!(
        lower_err(&proc),
        LowerError::YieldIndexGap {
            expected: 2,
            found: 3
        }
    );
}

// ── Block layout ────────────────────────────────────────────────────

#[test]
fn untargeted_dead_block_is_omitted() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let dead = builder.new_block();
    builder.goto(start, exit).push(dead, void_call(n(40)));
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    let body = lower(&proc);
    assert_eq!(
        body.instrs,
        vec![Instr::MarkLabel(l(0)), Instr::Return { with_value: false }]
    );
    assert_eq!(body.label_count, 1);
}

fn diamond() -> (Procedure, LocalId) {
    let mut locals = LocalsTable::new();
    let flag = locals.declare(n(10), Ty::Bool, VarKind::Parameter);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let then_b = builder.new_block();
    let else_b = builder.new_block();
    builder
        .set_edge(
            start,
            Edge::Conditional {
                condition: BoundExpr::local(flag, Ty::Bool),
                on_true: then_b,
                on_false: else_b,
            },
        )
        .push(then_b, void_call(n(20)))
        .goto(then_b, exit)
        .push(else_b, void_call(n(21)))
        .goto(else_b, exit);
    (make_proc(Ty::Void, locals, builder), flag)
}

#[test]
fn conditional_inverts_when_true_target_is_next() {
    let (proc, flag) = diamond();
    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::LoadLocal(flag),
            Instr::BranchIf {
                when: false,
                target: l(1)
            },
            Instr::MarkLabel(l(0)),
            call(n(20), 0, false),
            Instr::Branch(l(2)),
            Instr::MarkLabel(l(1)),
            call(n(21), 0, false),
            Instr::MarkLabel(l(2)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn reverse_postorder_lets_false_target_fall_through() {
    let (proc, flag) = diamond();
    let options = release().with_order(BlockOrder::ReversePostorder);
    assert_eq!(
        lower_with(&proc, &options).instrs,
        vec![
            Instr::LoadLocal(flag),
            Instr::BranchIf {
                when: true,
                target: l(0)
            },
            Instr::MarkLabel(l(1)),
            call(n(21), 0, false),
            Instr::Branch(l(2)),
            Instr::MarkLabel(l(0)),
            call(n(20), 0, false),
            Instr::MarkLabel(l(2)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn multiway_edge_becomes_switch() {
    let mut locals = LocalsTable::new();
    let sel = locals.declare(n(10), Ty::Int, VarKind::Parameter);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let one = builder.new_block();
    let two = builder.new_block();
    builder
        .set_edge(
            start,
            Edge::MultiWay {
                selector: BoundExpr::local(sel, Ty::Int),
                cases: vec![(1, one), (2, two)],
                default: exit,
            },
        )
        .push(one, void_call(n(20)))
        .goto(one, exit)
        .push(two, void_call(n(21)))
        .goto(two, exit);
    let proc = make_proc(Ty::Void, locals, builder);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::LoadLocal(sel),
            Instr::Switch {
                cases: vec![(1, l(0)), (2, l(1))],
                default: l(2),
            },
            Instr::MarkLabel(l(0)),
            call(n(20), 0, false),
            Instr::Branch(l(2)),
            Instr::MarkLabel(l(1)),
            call(n(21), 0, false),
            Instr::MarkLabel(l(2)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn protected_region_and_handler() {
    let mut locals = LocalsTable::new();
    let exc = locals.declare(n(11), Ty::Value, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let body_b = builder.new_block();
    let handler_b = builder.new_block();
    builder
        .set_edge(
            start,
            Edge::Exceptional {
                body: body_b,
                handler: handler_b,
                exception: Some(exc),
            },
        )
        .push(body_b, void_call(n(20)))
        .set_edge(body_b, Edge::Leave(exit))
        .push(handler_b, void_call(n(21)))
        .set_edge(handler_b, Edge::Leave(exit));
    let proc = make_proc(Ty::Void, locals, builder);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::ConstNull,
            Instr::StoreLocal(exc),
            Instr::EnterTry { handler: l(1) },
            Instr::MarkLabel(l(0)),
            call(n(20), 0, false),
            Instr::Leave(l(2)),
            Instr::MarkLabel(l(1)),
            Instr::StoreLocal(exc),
            call(n(21), 0, false),
            Instr::Leave(l(2)),
            Instr::MarkLabel(l(2)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn reachable_block_without_edge_is_rejected() {
    let mut builder = CfgBuilder::new();
    let start = builder.start();
    let stuck = builder.new_block();
    builder
        .goto(start, stuck)
        .push(stuck, void_call(n(20)))
        .set_edge(stuck, Edge::None);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    assert_eq!(lower_err(&proc), LowerError::FallsOffBlock(stuck));
}

#[test]
fn block_ending_in_throw_needs_no_edge() {
    let mut builder = CfgBuilder::new();
    let start = builder.start();
    builder.push(start, BoundStatement::Throw(BoundExpr::null()));
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    let body = lower(&proc);
    assert_eq!(body.instrs[2], Instr::Throw);
    // Nothing branches to Exit and nothing falls into it.
    assert_eq!(body.instrs.len(), 3);
}

struct DropsExit;

impl EmitOrder for DropsExit {
    fn arrange(&self, cfg: &ControlFlowGraph, reachable: &[BlockId]) -> Vec<BlockId> {
        reachable
            .iter()
            .copied()
            .filter(|&id| id != cfg.exit())
            .collect()
    }
}

#[test]
fn bad_order_strategy_is_rejected() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder.goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    let mut sink = InstrBuffer::new();
    assert_eq!(
        lower_procedure_into(&proc, &release(), &DropsExit, &mut sink),
        Err(LowerError::InvalidEmitOrder)
    );
    assert!(sink.as_slice().is_empty());
}

// ── Statements ──────────────────────────────────────────────────────

#[test]
fn locals_get_default_values() {
    let mut locals = LocalsTable::new();
    let count = locals.declare(n(10), Ty::Int, VarKind::Local);
    let _param = locals.declare(n(11), Ty::Int, VarKind::Parameter);
    let flag = locals.declare(Name::EMPTY, Ty::Bool, VarKind::Temporary);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder.goto(start, exit);
    let proc = make_proc(Ty::Void, locals, builder);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::ConstInt(0),
            Instr::StoreLocal(count),
            Instr::ConstBool(false),
            Instr::StoreLocal(flag),
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn static_initializes_once() {
    let mut locals = LocalsTable::new();
    let counter = locals.declare(n(10), Ty::Value, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(
            start,
            BoundStatement::Static(StaticVarDecl {
                var: counter,
                key: n(50),
                initializer: Some(BoundExpr::int(0)),
            }),
        )
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.flags.locals_initialized = true;

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::LoadContext,
            Instr::ConstStr(n(50)),
            rt(RuntimeFn::StaticHolder),
            Instr::StoreLocal(counter),
            Instr::LoadLocal(counter),
            rt(RuntimeFn::StaticIsInitialized),
            Instr::BranchIf {
                when: true,
                target: l(1)
            },
            Instr::LoadLocal(counter),
            Instr::ConstInt(0),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value
            },
            rt(RuntimeFn::StaticInitialize),
            Instr::MarkLabel(l(1)),
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn unset_goes_through_locals_array() {
    let mut locals = LocalsTable::new();
    let array = locals.declare(Name::EMPTY, Ty::Array, VarKind::Temporary);
    let x = locals.declare(n(12), Ty::Value, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::Unset(RefExpr::Local(x)))
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.locals_array = Some(array);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::ConstInt(2),
            rt(RuntimeFn::NewLocalsArray),
            Instr::StoreLocal(array),
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            rt(RuntimeFn::RemoveKey),
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn unset_then_read_sees_the_locals_array() {
    let mut locals = LocalsTable::new();
    let array = locals.declare(Name::EMPTY, Ty::Array, VarKind::Temporary);
    let x = locals.declare(n(12), Ty::Value, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(
            start,
            BoundStatement::Expression(BoundExpr::assign(x, BoundExpr::int(1), Ty::Void)),
        )
        .push(start, BoundStatement::Unset(RefExpr::Local(x)))
        .push(
            start,
            BoundStatement::Return(Some(BoundExpr::local(x, Ty::Value))),
        )
        .goto(start, exit);
    let mut proc = make_proc(Ty::Value, locals, builder);
    proc.locals_array = Some(array);

    let instrs = lower(&proc).instrs;
    assert_eq!(
        instrs,
        vec![
            Instr::ConstInt(2),
            rt(RuntimeFn::NewLocalsArray),
            Instr::StoreLocal(array),
            // $x = 1
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            Instr::ConstInt(1),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value
            },
            rt(RuntimeFn::ArraySet),
            // unset($x)
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            rt(RuntimeFn::RemoveKey),
            // return $x
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            rt(RuntimeFn::ArrayGet),
            Instr::AllocTemp {
                slot: t(0),
                ty: Ty::Value
            },
            Instr::StoreTemp(t(0)),
            Instr::Branch(l(1)),
            Instr::MarkLabel(l(0)),
            Instr::MarkLabel(l(1)),
            Instr::LoadTemp(t(0)),
            Instr::Return { with_value: true },
            Instr::FreeTemp(t(0)),
        ]
    );
    assert!(!instrs
        .iter()
        .any(|i| matches!(i, Instr::LoadLocal(id) | Instr::StoreLocal(id) if *id == x)));
}

#[test]
fn parameters_are_copied_into_the_locals_array() {
    let mut locals = LocalsTable::new();
    let array = locals.declare(Name::EMPTY, Ty::Array, VarKind::Temporary);
    let p = locals.declare(n(13), Ty::Int, VarKind::Parameter);
    let x = locals.declare(n(12), Ty::Value, VarKind::Local);
    let g = locals.declare(n(16), Ty::Value, VarKind::Local);
    let tmp = locals.declare(Name::EMPTY, Ty::Bool, VarKind::Temporary);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(
            start,
            BoundStatement::Expression(BoundExpr::local(p, Ty::Int)),
        )
        .push(
            start,
            BoundStatement::Expression(BoundExpr::assign(x, BoundExpr::int(7), Ty::Value)),
        )
        .push(start, BoundStatement::Global(g))
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.locals_array = Some(array);

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::ConstInt(5),
            rt(RuntimeFn::NewLocalsArray),
            Instr::StoreLocal(array),
            Instr::LoadLocal(array),
            Instr::ConstStr(n(13)),
            Instr::LoadLocal(p),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value
            },
            rt(RuntimeFn::ArraySet),
            // Only the unnamed temporary keeps a slot.
            Instr::ConstBool(false),
            Instr::StoreLocal(tmp),
            // $p;
            Instr::LoadLocal(array),
            Instr::ConstStr(n(13)),
            rt(RuntimeFn::ArrayGet),
            Instr::Convert {
                from: Ty::Value,
                to: Ty::Int
            },
            Instr::Pop,
            // ($x = 7) as a value is read back from the array.
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            Instr::ConstInt(7),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value
            },
            rt(RuntimeFn::ArraySet),
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            rt(RuntimeFn::ArrayGet),
            Instr::Pop,
            // global $g;
            Instr::LoadLocal(array),
            Instr::ConstStr(n(16)),
            Instr::LoadContext,
            Instr::ConstStr(n(16)),
            rt(RuntimeFn::GlobalRef),
            rt(RuntimeFn::ArraySet),
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn handler_stores_exception_into_locals_array() {
    let mut locals = LocalsTable::new();
    let array = locals.declare(Name::EMPTY, Ty::Array, VarKind::Temporary);
    let exc = locals.declare(n(11), Ty::Value, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let body_b = builder.new_block();
    let handler_b = builder.new_block();
    builder
        .set_edge(
            start,
            Edge::Exceptional {
                body: body_b,
                handler: handler_b,
                exception: Some(exc),
            },
        )
        .push(body_b, void_call(n(20)))
        .set_edge(body_b, Edge::Leave(exit))
        .push(handler_b, void_call(n(21)))
        .set_edge(handler_b, Edge::Leave(exit));
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.locals_array = Some(array);

    let body = lower(&proc);
    assert_eq!(
        body.instrs,
        vec![
            Instr::ConstInt(2),
            rt(RuntimeFn::NewLocalsArray),
            Instr::StoreLocal(array),
            Instr::EnterTry { handler: l(1) },
            Instr::MarkLabel(l(0)),
            call(n(20), 0, false),
            Instr::Leave(l(2)),
            Instr::MarkLabel(l(1)),
            Instr::AllocTemp {
                slot: t(0),
                ty: Ty::Value
            },
            Instr::StoreTemp(t(0)),
            Instr::LoadLocal(array),
            Instr::ConstStr(n(11)),
            Instr::LoadTemp(t(0)),
            rt(RuntimeFn::ArraySet),
            Instr::FreeTemp(t(0)),
            call(n(21), 0, false),
            Instr::Leave(l(2)),
            Instr::MarkLabel(l(2)),
            Instr::Return { with_value: false },
        ]
    );
    assert_eq!(body.temps, vec![Ty::Value]);
}

#[test]
fn unset_forms() {
    let mut locals = LocalsTable::new();
    let x = locals.declare(n(12), Ty::Value, VarKind::Local);
    let arr = locals.declare(n(13), Ty::Array, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::Unset(RefExpr::Local(x)))
        .push(
            start,
            BoundStatement::Unset(RefExpr::Item {
                array: BoundExpr::local(arr, Ty::Array),
                key: BoundExpr::str(n(14)),
            }),
        )
        .push(
            start,
            BoundStatement::Unset(RefExpr::Property {
                instance: BoundExpr::local(x, Ty::Value),
                name: n(15),
            }),
        )
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.flags.locals_initialized = true;

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::ClearLocal(x),
            Instr::LoadLocal(arr),
            Instr::ConstStr(n(14)),
            Instr::Convert {
                from: Ty::String,
                to: Ty::Value
            },
            rt(RuntimeFn::RemoveKey),
            Instr::LoadLocal(x),
            Instr::ConstStr(n(15)),
            rt(RuntimeFn::UnsetProperty),
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn declarations_globals_and_constants() {
    let mut locals = LocalsTable::new();
    let g = locals.declare(n(16), Ty::Value, VarKind::Local);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::FunctionDecl(n(60)))
        .push(start, BoundStatement::TypeDecl(n(61)))
        .push(start, BoundStatement::Global(g))
        .push(
            start,
            BoundStatement::GlobalConst {
                name: n(62),
                value: BoundExpr::int(3),
            },
        )
        .push(start, BoundStatement::Declare)
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.flags.locals_initialized = true;

    assert_eq!(
        lower(&proc).instrs,
        vec![
            Instr::LoadContext,
            Instr::ConstStr(n(60)),
            rt(RuntimeFn::DeclareFunction),
            Instr::LoadContext,
            Instr::ConstStr(n(61)),
            rt(RuntimeFn::DeclareType),
            Instr::LoadContext,
            Instr::ConstStr(n(16)),
            rt(RuntimeFn::GlobalRef),
            Instr::StoreLocal(g),
            Instr::LoadContext,
            Instr::ConstStr(n(62)),
            Instr::ConstInt(3),
            Instr::Convert {
                from: Ty::Int,
                to: Ty::Value
            },
            rt(RuntimeFn::DefineConstant),
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
        ]
    );
}

#[test]
fn throw_without_value_is_rejected() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(
            start,
            BoundStatement::Throw(BoundExpr::call(n(20), vec![], Ty::Void)),
        )
        .goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    assert_eq!(
        lower_err(&proc),
        LowerError::MissingValue {
            context: "thrown expression"
        }
    );
}

#[test]
fn unknown_local_is_rejected() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    let ghost = LocalId::new(9);
    builder
        .push(
            start,
            BoundStatement::Expression(BoundExpr::local(ghost, Ty::Int)),
        )
        .goto(start, exit);
    let proc = make_proc(Ty::Void, LocalsTable::new(), builder);

    assert_eq!(lower_err(&proc), LowerError::UnknownLocal(ghost));
}

// ── Prologue ────────────────────────────────────────────────────────

#[test]
fn debug_prologue_of_script_main() {
    let mut locals = LocalsTable::new();
    let array = locals.declare(Name::EMPTY, Ty::Array, VarKind::Temporary);
    let _x = locals.declare(n(12), Ty::Value, VarKind::Local);
    let tmp = locals.declare(Name::EMPTY, Ty::Int, VarKind::Temporary);
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::Empty(Some(Span::new(12, 13))))
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, locals, builder);
    proc.kind = ProcedureKind::ScriptMain { script: n(70) };
    proc.flags.is_static = true;
    proc.locals_array = Some(array);
    proc.body_span = Some(Span::new(10, 50));

    let body = lower_with(&proc, &EmitOptions::debug());
    assert_eq!(
        body.instrs,
        vec![
            Instr::HiddenSequencePoint,
            Instr::LoadContext,
            rt(RuntimeFn::DebugAssertNotNull),
            Instr::LoadContext,
            Instr::ConstStr(n(70)),
            rt(RuntimeFn::OnInclude),
            Instr::ConstInt(3),
            rt(RuntimeFn::NewLocalsArray),
            Instr::StoreLocal(array),
            Instr::ConstInt(0),
            Instr::StoreLocal(tmp),
            Instr::AllocTemp {
                slot: t(0),
                ty: Ty::Value
            },
            Instr::LoadLocal(array),
            Instr::ConstStr(n(12)),
            rt(RuntimeFn::IndirectLocal),
            Instr::StoreTemp(t(0)),
            Instr::SequencePoint(Span::new(10, 11)),
            Instr::Nop,
            Instr::SequencePoint(Span::new(12, 13)),
            Instr::Nop,
            Instr::MarkLabel(l(0)),
            Instr::Return { with_value: false },
            Instr::FreeTemp(t(0)),
        ]
    );
    assert_eq!(body.debug_locals, vec![(n(12), t(0))]);
}

#[test]
fn release_prologue_skips_debug_code() {
    let mut builder = CfgBuilder::new();
    let (start, exit) = (builder.start(), builder.exit());
    builder
        .push(start, BoundStatement::Empty(Some(Span::new(12, 13))))
        .goto(start, exit);
    let mut proc = make_proc(Ty::Void, LocalsTable::new(), builder);
    proc.flags.is_static = true;
    proc.body_span = Some(Span::new(10, 50));

    assert_eq!(
        lower(&proc).instrs,
        vec![Instr::MarkLabel(l(0)), Instr::Return { with_value: false }]
    );
}

#[test]
fn lowering_is_deterministic() {
    let (proc, _) = diamond();
    let first = lower(&proc);
    for _ in 0..4 {
        assert_eq!(lower(&proc), first);
    }
}
