//! Emission driver: bound control-flow graph → stack-machine instructions.
//!
//! One [`Emitter`] lowers one procedure. It owns every piece of
//! per-procedure state (labels, temporaries, the abstract evaluation
//! stack, return staging and the generator plan) and pushes instructions
//! into the caller's [`InstrSink`].
//!
//! # Architecture
//!
//! - `mod.rs` — block walk, label placement, stack tracking.
//! - `prologue.rs` — Start block entry code.
//! - `stmt.rs` / `expr.rs` — statement and expression lowering.
//! - `edge.rs` — block terminators.
//! - `exit.rs` — return staging and the Exit block epilogue.
//! - `generator.rs` — resumable state machine for generators.
//! - `place.rs` — variable loads and stores, direct or through the
//!   locals array.
//!
//! # Reachability
//!
//! The emitter tracks whether the current position can be reached. After
//! a flow-ending instruction everything up to the next label is dead and
//! is dropped, except temporary bookkeeping. A label placed after dead
//! code revives flow unless it is known to have no pending references.

mod edge;
mod exit;
mod expr;
mod generator;
mod place;
mod prologue;
mod stmt;

use quill_bound::{BasicBlock, BlockId, BlockKind, Edge, LocalId, LocalVar, Name, Procedure, Ty};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::LowerError;
use crate::instr::{Callee, Instr, Label, RuntimeFn, TempSlot};
use crate::labels::LabelTable;
use crate::options::EmitOptions;
use crate::order::{emission_order, EmitOrder};
use crate::sink::{EmitSummary, InstrSink};
use crate::temps::TempPool;

use self::exit::ExitStaging;
use self::generator::GeneratorLowering;

pub use self::generator::GeneratorState;

/// Abstract evaluation stack at the current emission position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct StackState {
    depth: usize,
    reachable: bool,
}

impl StackState {
    const ENTRY: StackState = StackState {
        depth: 0,
        reachable: true,
    };

    const DEAD: StackState = StackState {
        depth: 0,
        reachable: false,
    };
}

pub(crate) struct Emitter<'a> {
    proc: &'a Procedure,
    options: &'a EmitOptions,
    sink: &'a mut dyn InstrSink,
    /// Sink length before this procedure's first instruction.
    base: usize,
    labels: LabelTable,
    temps: TempPool,
    stack: StackState,
    block_labels: FxHashMap<BlockId, Label>,
    /// Handler blocks and the local receiving the exception, if any.
    handlers: FxHashMap<BlockId, Option<LocalId>>,
    /// Labels entered with the exception on the stack.
    handler_labels: FxHashSet<Label>,
    exit: ExitStaging,
    generator: Option<GeneratorLowering>,
    debug_locals: Vec<(Name, TempSlot)>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(
        proc: &'a Procedure,
        options: &'a EmitOptions,
        sink: &'a mut dyn InstrSink,
    ) -> Self {
        let base = sink.len();
        Emitter {
            proc,
            options,
            sink,
            base,
            labels: LabelTable::new(),
            temps: TempPool::new(),
            stack: StackState::ENTRY,
            block_labels: FxHashMap::default(),
            handlers: FxHashMap::default(),
            handler_labels: FxHashSet::default(),
            exit: ExitStaging::default(),
            generator: None,
            debug_locals: Vec::new(),
        }
    }

    /// Lower the whole procedure.
    pub(crate) fn run(mut self, strategy: &dyn EmitOrder) -> Result<EmitSummary, LowerError> {
        let proc = self.proc;
        let cfg = &proc.cfg;

        let mut roots = vec![cfg.start()];
        if proc.is_generator() {
            roots.extend(cfg.yields().iter().map(|site| site.block));
        }
        let live = cfg.reachable_from(&roots);

        let mut reachable = Vec::with_capacity(live.len() + 1);
        for block in cfg.blocks() {
            if live.contains(&block.id) || block.kind == BlockKind::Exit {
                reachable.push(block.id);
            } else {
                tracing::warn!(
                    block = block.id.raw(),
                    statements = block.statements.len(),
                    edge = block.edge.kind_name(),
                    "skipping unreachable block"
                );
            }
        }

        let order =
            emission_order(strategy, cfg, &reachable).ok_or(LowerError::InvalidEmitOrder)?;

        self.allocate_block_labels(&order);
        if proc.is_generator() {
            self.generator = Some(GeneratorLowering::plan(cfg.yields(), &mut self.labels)?);
        }

        tracing::debug!(
            blocks = order.len(),
            skipped = cfg.len() - order.len(),
            yields = cfg.yields().len(),
            generator = proc.is_generator(),
            "lowering procedure"
        );

        for (i, &id) in order.iter().enumerate() {
            let next = order.get(i + 1).copied();
            self.emit_block(cfg.block(id), next)?;
        }

        self.finish()
    }

    /// Give every edge target a label before anything is emitted.
    fn allocate_block_labels(&mut self, order: &[BlockId]) {
        let proc = self.proc;
        let cfg = &proc.cfg;
        for &id in order {
            let edge = &cfg.block(id).edge;
            if let Edge::Exceptional {
                handler, exception, ..
            } = edge
            {
                self.handlers.insert(*handler, *exception);
            }
            for target in edge.targets() {
                self.block_labels
                    .entry(target)
                    .or_insert_with(|| self.labels.new_label());
            }
        }
        self.handler_labels = self
            .handlers
            .keys()
            .filter_map(|block| self.block_labels.get(block).copied())
            .collect();
    }

    fn emit_block(&mut self, block: &BasicBlock, next: Option<BlockId>) -> Result<(), LowerError> {
        tracing::trace!(
            block = block.id.raw(),
            kind = ?block.kind,
            statements = block.statements.len(),
            "emitting block"
        );

        match block.kind {
            // Back-edges to Start must not re-run the prologue.
            BlockKind::Start => {
                self.emit_prologue()?;
                self.enter_block(block.id)?;
            }
            BlockKind::Exit | BlockKind::Normal => self.enter_block(block.id)?,
        }

        for stmt in &block.statements {
            self.emit_statement(stmt)?;
            self.check_balanced("end of statement")?;
        }

        if block.kind == BlockKind::Exit {
            return self.emit_exit();
        }
        self.emit_edge(block, next)
    }

    /// Place the block's label, if any, and receive a pending exception.
    fn enter_block(&mut self, id: BlockId) -> Result<(), LowerError> {
        let Some(&label) = self.block_labels.get(&id) else {
            return Ok(());
        };
        if id == self.proc.cfg.exit() {
            // Exit is emitted last: every branch to it is already known.
            self.place_label(label, false)?;
        } else {
            self.place_label(label, true)?;
        }
        if let Some(&exception) = self.handlers.get(&id) {
            match exception {
                Some(local) => self.emit_store_pending(local)?,
                None => self.emit(Instr::Pop)?,
            }
        }
        Ok(())
    }

    pub(super) fn block_label(&self, id: BlockId) -> Result<Label, LowerError> {
        self.block_labels
            .get(&id)
            .copied()
            .ok_or(LowerError::UnlabeledBlock(id))
    }

    // ── Instruction emission ────────────────────────────────────

    /// Push one instruction, tracking stack depth and reachability.
    ///
    /// Dead instructions are dropped; bookkeeping always passes.
    pub(super) fn emit(&mut self, instr: Instr) -> Result<(), LowerError> {
        if let Instr::MarkLabel(label) = instr {
            return self.place_label(label, true);
        }

        if !self.stack.reachable {
            if instr.is_bookkeeping() {
                self.sink.emit(instr);
            } else {
                tracing::trace!(instr = instr.mnemonic(), "eliding unreachable instruction");
            }
            return Ok(());
        }

        let (pops, pushes) = instr.stack_effect();
        let depth = self.stack.depth;
        if pops > depth {
            return Err(LowerError::StackUnderflow {
                instr: instr.mnemonic(),
                depth,
            });
        }
        if let Instr::Return { with_value } = &instr {
            let expected = usize::from(*with_value);
            if depth != expected {
                return Err(LowerError::StackImbalance {
                    site: "return",
                    depth,
                    expected,
                });
            }
        }
        self.stack.depth = depth - pops + pushes;

        for target in instr.branch_targets() {
            self.labels.reference(target)?;
        }
        let is_jump = matches!(
            instr,
            Instr::Branch(_) | Instr::BranchIf { .. } | Instr::Switch { .. } | Instr::Leave(_)
        );
        if is_jump {
            self.check_balanced("branch")?;
        }

        let ends_flow = instr.ends_flow();
        self.sink.emit(instr);
        if ends_flow {
            self.stack = StackState::DEAD;
        }
        Ok(())
    }

    /// Mark `label` at the current position.
    ///
    /// `may_be_referenced_later` is false for labels whose every branch
    /// precedes the mark; flow then stays dead unless something jumped
    /// here.
    fn place_label(&mut self, label: Label, may_be_referenced_later: bool) -> Result<(), LowerError> {
        let is_handler = self.handler_labels.contains(&label);
        if self.stack.reachable && (is_handler || self.stack.depth != 0) {
            return Err(LowerError::StackImbalance {
                site: if is_handler { "handler entry" } else { "label" },
                depth: self.stack.depth,
                expected: usize::from(is_handler),
            });
        }

        self.labels.mark(label, self.sink.len())?;
        self.sink.emit(Instr::MarkLabel(label));
        tracing::trace!(label = label.raw(), name = ?self.labels.name(label), "marked label");

        let reachable = self.stack.reachable
            || is_handler
            || may_be_referenced_later
            || self.labels.is_referenced(label);
        self.stack = StackState {
            depth: usize::from(is_handler),
            reachable,
        };
        Ok(())
    }

    /// Mark a label all of whose branches have already been emitted.
    pub(super) fn place_forward_label(&mut self, label: Label) -> Result<(), LowerError> {
        self.place_label(label, false)
    }

    pub(super) fn call_runtime(&mut self, helper: RuntimeFn) -> Result<(), LowerError> {
        self.emit(Instr::Call {
            callee: Callee::Runtime(helper),
            argc: helper.arity(),
            returns: helper.returns_value(),
        })
    }

    fn check_balanced(&self, site: &'static str) -> Result<(), LowerError> {
        if self.stack.reachable && self.stack.depth != 0 {
            return Err(LowerError::StackImbalance {
                site,
                depth: self.stack.depth,
                expected: 0,
            });
        }
        Ok(())
    }

    // ── Temporaries ─────────────────────────────────────────────

    pub(super) fn acquire_temp(&mut self, ty: Ty) -> Result<TempSlot, LowerError> {
        let (slot, fresh) = self.temps.acquire(ty);
        if fresh {
            self.emit(Instr::AllocTemp { slot, ty })?;
        }
        Ok(slot)
    }

    pub(super) fn release_temp(&mut self, slot: TempSlot) -> Result<(), LowerError> {
        self.temps.release(slot)?;
        tracing::trace!(slot = slot.raw(), ty = ?self.temps.ty(slot), "released temporary");
        self.emit(Instr::FreeTemp(slot))
    }

    // ── Locals ──────────────────────────────────────────────────

    pub(super) fn local(&self, id: LocalId) -> Result<&'a LocalVar, LowerError> {
        let proc: &'a Procedure = self.proc;
        proc.locals.get(id).ok_or(LowerError::UnknownLocal(id))
    }

    fn finish(mut self) -> Result<EmitSummary, LowerError> {
        let shadow: Vec<TempSlot> = self.debug_locals.iter().map(|&(_, slot)| slot).collect();
        for slot in shadow {
            self.release_temp(slot)?;
        }

        self.labels.finish()?;
        if let Some(slot) = self.temps.first_leaked() {
            return Err(LowerError::TempLeaked(slot));
        }

        let resume_points = self
            .generator
            .as_ref()
            .map(GeneratorLowering::resume_points)
            .unwrap_or_default();
        let instr_count = self.sink.len() - self.base;

        tracing::debug!(
            instrs = instr_count,
            labels = self.labels.len(),
            temps = self.temps.len(),
            "procedure lowered"
        );

        Ok(EmitSummary {
            instr_count,
            temps: self.temps.into_slot_types(),
            label_count: self.labels.len(),
            resume_points,
            debug_locals: self.debug_locals,
        })
    }
}

#[cfg(test)]
mod tests;
