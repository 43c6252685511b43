//! Block terminators.
//!
//! An edge to the block emitted next falls through; everything else is an
//! explicit branch to the target's label.

use quill_bound::{BasicBlock, BlockId, Edge, Ty};

use crate::error::LowerError;
use crate::instr::Instr;

use super::Emitter;

impl Emitter<'_> {
    pub(super) fn emit_edge(
        &mut self,
        block: &BasicBlock,
        next: Option<BlockId>,
    ) -> Result<(), LowerError> {
        match &block.edge {
            Edge::Unconditional(target) => self.emit_jump(*target, next),
            Edge::Conditional {
                condition,
                on_true,
                on_false,
            } => {
                self.emit_value(condition, Ty::Bool, "branch condition")?;
                if on_true == on_false {
                    self.emit(Instr::Pop)?;
                    return self.emit_jump(*on_true, next);
                }
                if Some(*on_true) == next {
                    // Invert so the true target falls through.
                    let target = self.block_label(*on_false)?;
                    self.emit(Instr::BranchIf {
                        when: false,
                        target,
                    })
                } else {
                    let target = self.block_label(*on_true)?;
                    self.emit(Instr::BranchIf { when: true, target })?;
                    self.emit_jump(*on_false, next)
                }
            }
            Edge::MultiWay {
                selector,
                cases,
                default,
            } => {
                self.emit_value(selector, Ty::Int, "switch selector")?;
                let cases = cases
                    .iter()
                    .map(|&(key, target)| Ok((key, self.block_label(target)?)))
                    .collect::<Result<Vec<_>, LowerError>>()?;
                let default = self.block_label(*default)?;
                self.emit(Instr::Switch { cases, default })
            }
            Edge::Exceptional { body, handler, .. } => {
                let handler = self.block_label(*handler)?;
                self.emit(Instr::EnterTry { handler })?;
                self.emit_jump(*body, next)
            }
            Edge::Leave(target) => {
                let target = self.block_label(*target)?;
                self.emit(Instr::Leave(target))
            }
            Edge::None => {
                if self.stack.reachable {
                    tracing::error!(block = block.id.raw(), "block without edge falls off its end");
                    return Err(LowerError::FallsOffBlock(block.id));
                }
                Ok(())
            }
        }
    }

    fn emit_jump(&mut self, target: BlockId, next: Option<BlockId>) -> Result<(), LowerError> {
        if Some(target) == next {
            return Ok(());
        }
        let label = self.block_label(target)?;
        self.emit(Instr::Branch(label))
    }
}
