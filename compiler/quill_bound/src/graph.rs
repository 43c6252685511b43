//! Basic-block control-flow graph.
//!
//! Blocks live in an arena indexed by [`BlockId`]. Each block has an
//! ordinal (the default emission order), a statement list and exactly one
//! outgoing [`Edge`]. The graph has one distinguished Start block (the
//! single entry) and one Exit block (the single terminal, `Edge::None`).
//!
//! The backend never changes block membership; traversal helpers here
//! are read-only.

use rustc_hash::FxHashSet;
use smallvec::{smallvec, SmallVec};

use crate::{BoundExpr, BoundStatement, LocalId};

/// Basic block ID: index into [`ControlFlowGraph::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Procedure entry; owns the prologue.
    Start,
    /// Procedure terminal; owns return staging.
    Exit,
    Normal,
}

/// How control leaves a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    Unconditional(BlockId),
    Conditional {
        condition: BoundExpr,
        on_true: BlockId,
        on_false: BlockId,
    },
    /// Jump table over an integer selector.
    MultiWay {
        selector: BoundExpr,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    /// Enter a protected region starting at `body`. A throw inside the
    /// region transfers to `handler` with the exception on the stack;
    /// `exception` is the local it is stored to, if any.
    Exceptional {
        body: BlockId,
        handler: BlockId,
        exception: Option<LocalId>,
    },
    /// Leave the innermost protected region and continue at the target.
    Leave(BlockId),
    /// No successor: the block ends in return/throw, or is dead.
    None,
}

impl Edge {
    /// Successor blocks in edge order.
    ///
    /// Returns `SmallVec<[BlockId; 2]>`; only `MultiWay` spills.
    pub fn targets(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Edge::Unconditional(target) | Edge::Leave(target) => smallvec![*target],
            Edge::Conditional {
                on_true, on_false, ..
            } => smallvec![*on_true, *on_false],
            Edge::MultiWay { cases, default, .. } => {
                let mut targets = SmallVec::with_capacity(cases.len() + 1);
                for &(_, b) in cases {
                    targets.push(b);
                }
                targets.push(*default);
                targets
            }
            Edge::Exceptional { body, handler, .. } => smallvec![*body, *handler],
            Edge::None => SmallVec::new(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Edge::Unconditional(_) => "unconditional",
            Edge::Conditional { .. } => "conditional",
            Edge::MultiWay { .. } => "multi-way",
            Edge::Exceptional { .. } => "exceptional",
            Edge::Leave(_) => "leave",
            Edge::None => "none",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Unique; ascending ordinal is the default emission order.
    pub ordinal: u32,
    pub kind: BlockKind,
    pub statements: Vec<BoundStatement>,
    pub edge: Edge,
}

/// Location of a `yield` statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct YieldSite {
    pub index: i32,
    pub block: BlockId,
}

/// Malformed graph handed in by graph construction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("block at position {position} has id {id}")]
    MisnumberedBlock { position: usize, id: u32 },
    #[error("graph has {count} start blocks, expected exactly one")]
    StartCount { count: usize },
    #[error("graph has {count} exit blocks, expected exactly one")]
    ExitCount { count: usize },
    #[error("exit block {block} has a `{edge}` edge")]
    ExitHasEdge { block: u32, edge: &'static str },
    #[error("block {block} targets missing block {target}")]
    DanglingTarget { block: u32, target: u32 },
    #[error("handler block {handler} is also a normal target of block {block}")]
    HandlerEnteredNormally { handler: u32, block: u32 },
    #[error("block {handler} is the start or exit block and cannot be a handler")]
    ReservedHandler { handler: u32 },
    #[error("blocks {first} and {second} share ordinal {ordinal}")]
    DuplicateOrdinal {
        ordinal: u32,
        first: u32,
        second: u32,
    },
}

/// A procedure's control-flow graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    start: BlockId,
    exit: BlockId,
    yields: Vec<YieldSite>,
}

/// A handler is entered with the exception on the stack, so it can only
/// be reached through the `handler` side of an `Exceptional` edge.
fn check_handlers(
    blocks: &[BasicBlock],
    start: BlockId,
    exit: BlockId,
) -> Result<(), GraphError> {
    let handlers: FxHashSet<BlockId> = blocks
        .iter()
        .filter_map(|block| match block.edge {
            Edge::Exceptional { handler, .. } => Some(handler),
            _ => None,
        })
        .collect();
    if handlers.is_empty() {
        return Ok(());
    }

    for reserved in [start, exit] {
        if handlers.contains(&reserved) {
            return Err(GraphError::ReservedHandler {
                handler: reserved.raw(),
            });
        }
    }
    for block in blocks {
        let normal: SmallVec<[BlockId; 2]> = match &block.edge {
            Edge::Exceptional { body, .. } => smallvec![*body],
            edge => edge.targets(),
        };
        if let Some(handler) = normal.into_iter().find(|t| handlers.contains(t)) {
            return Err(GraphError::HandlerEnteredNormally {
                handler: handler.raw(),
                block: block.id.raw(),
            });
        }
    }
    Ok(())
}

impl ControlFlowGraph {
    /// Validate and assemble a graph.
    ///
    /// Collects every `Yield` statement into [`yields`](Self::yields) in
    /// block order. Yield index density is not checked here; that is a
    /// lowering-time invariant.
    pub fn new(blocks: Vec<BasicBlock>) -> Result<Self, GraphError> {
        let mut start = None;
        let mut exit = None;
        let mut starts = 0;
        let mut exits = 0;
        let mut ordinals = rustc_hash::FxHashMap::default();

        for (position, block) in blocks.iter().enumerate() {
            if block.id.index() != position {
                return Err(GraphError::MisnumberedBlock {
                    position,
                    id: block.id.raw(),
                });
            }
            match block.kind {
                BlockKind::Start => {
                    starts += 1;
                    start = Some(block.id);
                }
                BlockKind::Exit => {
                    exits += 1;
                    exit = Some(block.id);
                    if block.edge != Edge::None {
                        return Err(GraphError::ExitHasEdge {
                            block: block.id.raw(),
                            edge: block.edge.kind_name(),
                        });
                    }
                }
                BlockKind::Normal => {}
            }
            for target in block.edge.targets() {
                if target.index() >= blocks.len() {
                    return Err(GraphError::DanglingTarget {
                        block: block.id.raw(),
                        target: target.raw(),
                    });
                }
            }
            if let Some(first) = ordinals.insert(block.ordinal, block.id) {
                return Err(GraphError::DuplicateOrdinal {
                    ordinal: block.ordinal,
                    first: first.raw(),
                    second: block.id.raw(),
                });
            }
        }

        let (Some(start), 1) = (start, starts) else {
            return Err(GraphError::StartCount { count: starts });
        };
        let (Some(exit), 1) = (exit, exits) else {
            return Err(GraphError::ExitCount { count: exits });
        };

        check_handlers(&blocks, start, exit)?;

        let yields = blocks
            .iter()
            .flat_map(|block| {
                block.statements.iter().filter_map(move |stmt| match stmt {
                    BoundStatement::Yield(y) => Some(YieldSite {
                        index: y.index,
                        block: block.id,
                    }),
                    _ => None,
                })
            })
            .collect();

        Ok(ControlFlowGraph {
            blocks,
            start,
            exit,
            yields,
        })
    }

    #[inline]
    pub fn start(&self) -> BlockId {
        self.start
    }

    #[inline]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    #[inline]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every `yield` in the procedure, in block order.
    #[inline]
    pub fn yields(&self) -> &[YieldSite] {
        &self.yields
    }

    /// Successors of `id` in edge order.
    #[inline]
    pub fn successors(&self, id: BlockId) -> SmallVec<[BlockId; 2]> {
        self.block(id).edge.targets()
    }

    /// Blocks reachable from any of `roots`, as a membership set.
    ///
    /// Iterative DFS; deep graphs cannot overflow the stack.
    pub fn reachable_from(&self, roots: &[BlockId]) -> FxHashSet<BlockId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<BlockId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if id.index() >= self.blocks.len() || !seen.insert(id) {
                continue;
            }
            for succ in self.successors(id) {
                if !seen.contains(&succ) {
                    stack.push(succ);
                }
            }
        }
        seen
    }

    /// Postorder traversal from the Start block. Only reachable blocks
    /// are visited.
    pub fn postorder(&self) -> Vec<BlockId> {
        let num_blocks = self.blocks.len();
        let mut visited = vec![false; num_blocks];
        let mut postorder = Vec::with_capacity(num_blocks);

        // (block, children_pushed): the block is emitted on its second visit.
        let mut stack: Vec<(BlockId, bool)> = vec![(self.start, false)];

        while let Some(&mut (id, ref mut children_done)) = stack.last_mut() {
            if *children_done {
                postorder.push(id);
                stack.pop();
                continue;
            }
            *children_done = true;

            if visited[id.index()] {
                stack.pop();
                continue;
            }
            visited[id.index()] = true;

            // Push in reverse so the first edge target is visited first.
            for succ in self.successors(id).into_iter().rev() {
                if !visited[succ.index()] {
                    stack.push((succ, false));
                }
            }
        }

        postorder
    }

    /// Reverse postorder from the Start block.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }
}
