//! Internal compiler errors raised while lowering.
//!
//! Every variant is an invariant violation: it means the binder handed
//! over a graph the backend cannot lower, or the backend itself is
//! broken. None of them describe a problem in the user's program, so
//! there is no recovery; the procedure's compilation is aborted.

use quill_bound::{BlockId, LocalId};

use crate::instr::{Label, TempSlot};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    // ── Generators ──────────────────────────────────────────────
    #[error("yield index {index} is not positive")]
    NonPositiveYieldIndex { index: i32 },

    #[error("yield index {index} is declared more than once")]
    DuplicateYieldIndex { index: i32 },

    #[error("yield indices are not dense: expected {expected}, found {found}")]
    YieldIndexGap { expected: i32, found: i32 },

    #[error("no resume label for yield {index}")]
    MissingResumeLabel { index: i32 },

    #[error("yield {index} in a procedure that is not a generator")]
    YieldOutsideGenerator { index: i32 },

    // ── Evaluation stack ────────────────────────────────────────
    #[error("evaluation stack underflow at `{instr}` (depth {depth})")]
    StackUnderflow { instr: &'static str, depth: usize },

    #[error("evaluation stack depth {depth} at {site}, expected {expected}")]
    StackImbalance {
        site: &'static str,
        depth: usize,
        expected: usize,
    },

    #[error("{context} produced no value")]
    MissingValue { context: &'static str },

    // ── Labels ──────────────────────────────────────────────────
    #[error("label L{} marked twice", .0.raw())]
    LabelMarkedTwice(Label),

    #[error("label L{} is branched to but never marked", .0.raw())]
    UnmarkedLabel(Label),

    #[error("label L{} was never allocated", .0.raw())]
    UnknownLabel(Label),

    // ── Temporaries ─────────────────────────────────────────────
    #[error("temporary {} returned twice", .0.raw())]
    TempDoubleFree(TempSlot),

    #[error("temporary {} still checked out at end of procedure", .0.raw())]
    TempLeaked(TempSlot),

    #[error("return temporary read before any store")]
    ReturnSlotUnassigned,

    // ── Graph shape ─────────────────────────────────────────────
    #[error("block b{} falls off its end without an edge", .0.raw())]
    FallsOffBlock(BlockId),

    #[error("block b{} is branched to but has no label", .0.raw())]
    UnlabeledBlock(BlockId),

    #[error("emission order is not a permutation of the reachable blocks")]
    InvalidEmitOrder,

    #[error("local {} is not declared", .0.raw())]
    UnknownLocal(LocalId),
}
