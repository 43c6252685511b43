//! Return staging and the Exit block epilogue.
//!
//! Every `return` stores its value into one shared return temporary and
//! branches to the `<return>` label in the Exit block, so the procedure
//! has a single physical return for values. The temporary is created on
//! the first staged return of a non-void procedure; the label is created
//! on the first staged return of any procedure.

use quill_bound::Ty;

use crate::error::LowerError;
use crate::instr::{Instr, Label, RuntimeFn, TempSlot};

use super::generator::GeneratorState;
use super::Emitter;

#[derive(Debug, Default)]
pub(super) struct ExitStaging {
    return_temp: Option<TempSlot>,
    return_label: Option<Label>,
    /// Stores into the return temporary that were actually emitted.
    stores: usize,
}

impl Emitter<'_> {
    fn return_label(&mut self) -> Label {
        match self.exit.return_label {
            Some(label) => label,
            None => {
                let label = self.labels.named("<return>");
                self.exit.return_label = Some(label);
                label
            }
        }
    }

    /// Stage the value on the stack (of type `stack`) as the return value
    /// and branch to the return label.
    ///
    /// A void `stack` in a value-returning procedure stages the default
    /// value of the return type.
    pub(super) fn emit_tmp_ret(&mut self, stack: Ty) -> Result<(), LowerError> {
        let return_type = self.proc.return_type;
        if self.exit.return_temp.is_none() && !return_type.is_void() {
            self.exit.return_temp = Some(self.acquire_temp(return_type)?);
        }

        match self.exit.return_temp {
            Some(slot) => {
                if stack.is_void() {
                    self.emit_default(return_type)?;
                } else {
                    self.emit_convert(stack, return_type)?;
                }
                if self.stack.reachable {
                    self.exit.stores += 1;
                }
                self.emit(Instr::StoreTemp(slot))?;
            }
            None => {
                if !stack.is_void() {
                    self.emit(Instr::Pop)?;
                }
            }
        }

        let label = self.return_label();
        self.emit(Instr::Branch(label))
    }

    /// `return value;` inside a generator: record the value, then finish.
    pub(super) fn emit_generator_return(&mut self, stack: Ty) -> Result<(), LowerError> {
        if !stack.is_void() {
            self.emit_convert(stack, Ty::Value)?;
            self.call_runtime(RuntimeFn::SetGeneratorReturn)?;
        }
        let label = self.return_label();
        self.emit(Instr::Branch(label))
    }

    /// Exit block epilogue.
    pub(super) fn emit_exit(&mut self) -> Result<(), LowerError> {
        if self.proc.is_generator() {
            if let Some(label) = self.exit.return_label {
                self.place_forward_label(label)?;
            }
            self.emit_set_state(GeneratorState::Closed)?;
            return self.emit(Instr::Return { with_value: false });
        }

        if let (Some(label), None) = (self.exit.return_label, self.exit.return_temp) {
            self.place_forward_label(label)?;
        }

        // Reached only by paths that never staged a return.
        let return_type = self.proc.return_type;
        if return_type.is_void() {
            self.emit(Instr::Return { with_value: false })?;
        } else {
            self.emit_default(return_type)?;
            self.emit(Instr::Return { with_value: true })?;
        }

        if let Some(slot) = self.exit.return_temp {
            let label = self.return_label();
            if self.exit.stores > 0 {
                self.place_forward_label(label)?;
                self.emit(Instr::LoadTemp(slot))?;
                self.emit(Instr::Return { with_value: true })?;
            } else if self.labels.is_referenced(label) {
                return Err(LowerError::ReturnSlotUnassigned);
            }
            self.release_temp(slot)?;
        }
        Ok(())
    }

    /// Push the default value of `ty`. Pushes nothing for `Void`.
    pub(super) fn emit_default(&mut self, ty: Ty) -> Result<(), LowerError> {
        match ty.default_value() {
            Some(lit) => self.emit_literal(lit),
            None => Ok(()),
        }
    }
}
