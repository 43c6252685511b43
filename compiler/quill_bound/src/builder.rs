//! Incremental construction of a [`ControlFlowGraph`].
//!
//! Graph construction proper belongs to the binder; this builder is the
//! small, position-free API it (and the backend's tests) use to assemble
//! blocks before handing them over.

use crate::graph::{BasicBlock, BlockId, BlockKind, ControlFlowGraph, Edge, GraphError};
use crate::BoundStatement;

/// Builder for a control-flow graph.
///
/// A fresh builder already holds the Start block (`b0`) and the Exit
/// block (`b1`). New blocks get the next ID; ordinals default to the ID.
pub struct CfgBuilder {
    blocks: Vec<BasicBlock>,
}

impl Default for CfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfgBuilder {
    pub fn new() -> Self {
        let mut builder = CfgBuilder { blocks: Vec::new() };
        builder.push_block(BlockKind::Start);
        builder.push_block(BlockKind::Exit);
        builder
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "block counts never exceed u32"
    )]
    fn push_block(&mut self, kind: BlockKind) -> BlockId {
        let raw = self.blocks.len() as u32;
        let id = BlockId::new(raw);
        self.blocks.push(BasicBlock {
            id,
            ordinal: raw,
            kind,
            statements: Vec::new(),
            edge: Edge::None,
        });
        id
    }

    #[inline]
    pub fn start(&self) -> BlockId {
        BlockId::new(0)
    }

    #[inline]
    pub fn exit(&self) -> BlockId {
        BlockId::new(1)
    }

    /// Allocate a new empty block with `Edge::None`.
    pub fn new_block(&mut self) -> BlockId {
        self.push_block(BlockKind::Normal)
    }

    /// Append a statement to a block.
    pub fn push(&mut self, block: BlockId, stmt: BoundStatement) -> &mut Self {
        self.blocks[block.index()].statements.push(stmt);
        self
    }

    pub fn set_edge(&mut self, block: BlockId, edge: Edge) -> &mut Self {
        self.blocks[block.index()].edge = edge;
        self
    }

    /// Shorthand for an unconditional edge.
    pub fn goto(&mut self, block: BlockId, target: BlockId) -> &mut Self {
        self.set_edge(block, Edge::Unconditional(target))
    }

    pub fn set_ordinal(&mut self, block: BlockId, ordinal: u32) -> &mut Self {
        self.blocks[block.index()].ordinal = ordinal;
        self
    }

    /// Validate and produce the graph.
    pub fn finish(self) -> Result<ControlFlowGraph, GraphError> {
        ControlFlowGraph::new(self.blocks)
    }
}
