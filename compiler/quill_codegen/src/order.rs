//! Block emission order strategies.
//!
//! Emission order is policy, not semantics: any permutation of the
//! reachable blocks lowers correctly because every edge is emitted as an
//! explicit branch unless its target happens to be next. Strategies only
//! decide how many of those branches turn into fall-throughs.
//!
//! The driver always emits Start first and Exit last, whatever the
//! strategy returns.

use quill_bound::{BlockId, ControlFlowGraph};
use rustc_hash::FxHashSet;

/// Strategy choosing the order in which reachable blocks are emitted.
pub trait EmitOrder: Send + Sync {
    /// Arrange `reachable` (given in ascending ID order) into emission
    /// order. The result must be a permutation of `reachable`.
    fn arrange(&self, cfg: &ControlFlowGraph, reachable: &[BlockId]) -> Vec<BlockId>;
}

/// Ascending block ordinal, the order graph construction produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByOrdinal;

impl EmitOrder for ByOrdinal {
    fn arrange(&self, cfg: &ControlFlowGraph, reachable: &[BlockId]) -> Vec<BlockId> {
        let mut order = reachable.to_vec();
        order.sort_by_key(|&id| cfg.block(id).ordinal);
        order
    }
}

/// Reverse postorder from Start, so most forward edges fall through.
///
/// Blocks reachable only through resume points (generator yields outside
/// the Start-rooted traversal) follow in ordinal order.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReversePostorder;

impl EmitOrder for ReversePostorder {
    fn arrange(&self, cfg: &ControlFlowGraph, reachable: &[BlockId]) -> Vec<BlockId> {
        let wanted: FxHashSet<BlockId> = reachable.iter().copied().collect();
        let mut order: Vec<BlockId> = cfg
            .reverse_postorder()
            .into_iter()
            .filter(|id| wanted.contains(id))
            .collect();

        let placed: FxHashSet<BlockId> = order.iter().copied().collect();
        let mut rest: Vec<BlockId> = reachable
            .iter()
            .copied()
            .filter(|id| !placed.contains(id))
            .collect();
        rest.sort_by_key(|&id| cfg.block(id).ordinal);
        order.extend(rest);
        order
    }
}

/// Built-in strategy selector for [`EmitOptions`](crate::EmitOptions).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlockOrder {
    #[default]
    Ordinal,
    ReversePostorder,
}

impl BlockOrder {
    pub fn strategy(self) -> &'static dyn EmitOrder {
        match self {
            BlockOrder::Ordinal => &ByOrdinal,
            BlockOrder::ReversePostorder => &ReversePostorder,
        }
    }
}

/// Apply `strategy` and pin Start first and Exit last.
///
/// Returns `None` when the strategy's result is not a permutation of
/// `reachable`.
pub(crate) fn emission_order(
    strategy: &dyn EmitOrder,
    cfg: &ControlFlowGraph,
    reachable: &[BlockId],
) -> Option<Vec<BlockId>> {
    let arranged = strategy.arrange(cfg, reachable);
    if arranged.len() != reachable.len() {
        return None;
    }
    let allowed: FxHashSet<BlockId> = reachable.iter().copied().collect();
    let mut seen = FxHashSet::default();
    for id in &arranged {
        if !allowed.contains(id) || !seen.insert(*id) {
            return None;
        }
    }

    let (start, exit) = (cfg.start(), cfg.exit());
    let mut order = Vec::with_capacity(arranged.len());
    order.push(start);
    order.extend(
        arranged
            .into_iter()
            .filter(|&id| id != start && id != exit),
    );
    order.push(exit);
    Some(order)
}
