//! Start block entry code.
//!
//! Runs once per invocation, before the Start block's statements:
//! 1. hidden sequence point
//! 2. debug-build context assertion for static procedures
//! 3. script inclusion registration for script main routines
//! 4. locals initialization, parameters copied into the locals array
//! 5. debugger shadow locals for indirect variables
//! 6. opening-brace sequence point
//! 7. generator entry dispatch

use quill_bound::{LocalId, ProcedureKind, Ty, VarKind};

use crate::error::LowerError;
use crate::instr::{Instr, RuntimeFn};

use super::place::VarPlace;
use super::Emitter;

impl Emitter<'_> {
    pub(super) fn emit_prologue(&mut self) -> Result<(), LowerError> {
        let proc = self.proc;
        let options = self.options;

        if options.sequence_points {
            self.emit(Instr::HiddenSequencePoint)?;
        }

        if options.debug && proc.flags.is_static {
            self.emit(Instr::LoadContext)?;
            self.call_runtime(RuntimeFn::DebugAssertNotNull)?;
        }

        if let ProcedureKind::ScriptMain { script } = proc.kind {
            self.emit(Instr::LoadContext)?;
            self.emit(Instr::ConstStr(script))?;
            self.call_runtime(RuntimeFn::OnInclude)?;
        }

        if !proc.flags.locals_initialized {
            self.emit_locals_init()?;
        }

        if options.debug && options.sequence_points {
            if let Some(array) = proc.locals_array {
                self.emit_debug_locals(array)?;
            }
        }

        if options.debug {
            if let Some(body) = proc.body_span.filter(|span| span.is_valid()) {
                if options.sequence_points {
                    self.emit(Instr::SequencePoint(body.head()))?;
                }
                self.emit(Instr::Nop)?;
            }
        }

        self.emit_generator_dispatch()
    }

    /// Fresh locals array holding the parameters, then default values for
    /// every variable still kept in its own slot.
    ///
    /// User locals held in the array start out absent.
    fn emit_locals_init(&mut self) -> Result<(), LowerError> {
        let proc = self.proc;

        if let Some(array) = proc.locals_array {
            self.local(array)?;
            let count = i64::try_from(proc.locals.len()).unwrap_or(i64::MAX);
            self.emit(Instr::ConstInt(count))?;
            self.call_runtime(RuntimeFn::NewLocalsArray)?;
            self.emit(Instr::StoreLocal(array))?;
        }

        for var in proc.locals.iter() {
            if Some(var.id) == proc.locals_array {
                continue;
            }
            let place = self.place_of(var.id)?;
            match place {
                VarPlace::Indirect { .. } if var.kind == VarKind::Parameter => {
                    self.emit_store_prepare(place)?;
                    self.emit(Instr::LoadLocal(var.id))?;
                    self.emit_store(place)?;
                }
                VarPlace::Slot(local) if var.needs_init() => {
                    let Some(value) = var.ty.default_value() else {
                        continue;
                    };
                    self.emit_literal(value)?;
                    self.emit(Instr::StoreLocal(local))?;
                }
                VarPlace::Indirect { .. } | VarPlace::Slot(_) => {}
            }
        }
        Ok(())
    }

    /// One debugger-visible handle per named user variable held in the
    /// locals array.
    fn emit_debug_locals(&mut self, array: LocalId) -> Result<(), LowerError> {
        let proc = self.proc;
        let named = proc.locals.iter().filter(|var| {
            matches!(var.kind, VarKind::Local | VarKind::Parameter)
                && !var.name.is_empty()
                && var.id != array
        });

        for var in named {
            let slot = self.acquire_temp(Ty::Value)?;
            self.emit(Instr::LoadLocal(array))?;
            self.emit(Instr::ConstStr(var.name))?;
            self.call_runtime(RuntimeFn::IndirectLocal)?;
            self.emit(Instr::StoreTemp(slot))?;
            self.debug_locals.push((var.name, slot));
        }
        Ok(())
    }
}
