//! Generator lowering: an explicit resumable state machine.
//!
//! A generator keeps one integer state slot. Entry reads it, marks the
//! generator running, and jumps through a table keyed by yield index to
//! the matching resume label; any other state (in practice `NotStarted`)
//! takes the table's default and starts from the top. Each `yield`
//! publishes its value, stores its own index as the state, returns, and
//! marks its resume label right after the return.

use quill_bound::{Ty, YieldSite};

use crate::error::LowerError;
use crate::instr::{Instr, Label};
use crate::labels::LabelTable;

use super::Emitter;

/// Value of a generator's state slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeneratorState {
    /// Not run yet; entry falls through to the body.
    NotStarted,
    /// Currently executing.
    Running,
    /// Ran to completion.
    Closed,
    /// Suspended at the yield with this index (≥ 1).
    SuspendedAt(i32),
}

impl GeneratorState {
    pub fn to_raw(self) -> i32 {
        match self {
            GeneratorState::NotStarted => 0,
            GeneratorState::Running => -1,
            GeneratorState::Closed => -2,
            GeneratorState::SuspendedAt(index) => index,
        }
    }

    /// Decode a raw state. Negative values other than -1 and -2 are not
    /// states.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(GeneratorState::NotStarted),
            -1 => Some(GeneratorState::Running),
            -2 => Some(GeneratorState::Closed),
            n if n > 0 => Some(GeneratorState::SuspendedAt(n)),
            _ => None,
        }
    }
}

/// Resume labels planned for one generator.
#[derive(Debug)]
pub(super) struct GeneratorLowering {
    /// `resume[i]` is the label of yield `i + 1`.
    resume: Vec<Label>,
}

impl GeneratorLowering {
    /// Validate the yield indices and allocate one resume label each.
    ///
    /// Indices must be exactly `1..=N` with no repeats.
    pub(super) fn plan(yields: &[YieldSite], labels: &mut LabelTable) -> Result<Self, LowerError> {
        let mut indices: Vec<i32> = yields.iter().map(|site| site.index).collect();
        indices.sort_unstable();

        let mut expected = 1;
        for (i, &index) in indices.iter().enumerate() {
            if index < 1 {
                return Err(LowerError::NonPositiveYieldIndex { index });
            }
            if i > 0 && indices[i - 1] == index {
                return Err(LowerError::DuplicateYieldIndex { index });
            }
            if index != expected {
                return Err(LowerError::YieldIndexGap {
                    expected,
                    found: index,
                });
            }
            expected += 1;
        }

        let resume = indices.iter().map(|_| labels.new_label()).collect();
        Ok(GeneratorLowering { resume })
    }

    pub(super) fn resume_label(&self, index: i32) -> Option<Label> {
        let slot = usize::try_from(index).ok()?.checked_sub(1)?;
        self.resume.get(slot).copied()
    }

    /// `(index, label)` for every yield, ascending.
    pub(super) fn resume_points(&self) -> Vec<(i32, Label)> {
        (1..).zip(self.resume.iter().copied()).collect()
    }
}

impl Emitter<'_> {
    /// Entry dispatch: `tmp = state; state = Running; switch (tmp)`.
    pub(super) fn emit_generator_dispatch(&mut self) -> Result<(), LowerError> {
        let Some(plan) = self.generator.as_ref() else {
            return Ok(());
        };
        let cases = plan
            .resume_points()
            .into_iter()
            .map(|(index, label)| (i64::from(index), label))
            .collect();
        let no_continuation = self.labels.named("noStateContinuation");

        let state = self.acquire_temp(Ty::Int)?;
        self.emit(Instr::LoadGeneratorState)?;
        self.emit(Instr::StoreTemp(state))?;
        self.emit_set_state(GeneratorState::Running)?;
        self.emit(Instr::LoadTemp(state))?;
        self.emit(Instr::Switch {
            cases,
            default: no_continuation,
        })?;
        self.release_temp(state)?;

        self.place_forward_label(no_continuation)
    }

    pub(super) fn emit_set_state(&mut self, state: GeneratorState) -> Result<(), LowerError> {
        self.emit(Instr::ConstInt(i64::from(state.to_raw())))?;
        self.emit(Instr::StoreGeneratorState)
    }

    /// Suspend at yield `index` and place its resume label.
    pub(super) fn emit_suspend(&mut self, index: i32) -> Result<(), LowerError> {
        let label = self
            .generator
            .as_ref()
            .and_then(|plan| plan.resume_label(index))
            .ok_or(LowerError::MissingResumeLabel { index })?;

        self.emit_set_state(GeneratorState::SuspendedAt(index))?;
        self.emit(Instr::Return { with_value: false })?;
        // Resumption arrives here from the entry dispatch.
        self.place_forward_label(label)
    }
}
