//! Statement lowering.
//!
//! Each statement leaves the evaluation stack as it found it.

use quill_bound::{
    BoundExpr, BoundStatement, LocalId, Name, RefExpr, StaticVarDecl, Ty, YieldStmt,
};

use crate::error::LowerError;
use crate::instr::{Instr, RuntimeFn};

use super::Emitter;

impl Emitter<'_> {
    pub(super) fn emit_statement(&mut self, stmt: &BoundStatement) -> Result<(), LowerError> {
        tracing::trace!(kind = stmt.kind_name(), "lowering statement");

        if self.options.sequence_points {
            if let Some(span) = stmt.span() {
                self.emit(Instr::SequencePoint(span))?;
            }
        }

        match stmt {
            BoundStatement::Empty(span) => {
                if span.is_some() && self.options.sequence_points {
                    self.emit(Instr::Nop)?;
                }
                Ok(())
            }
            BoundStatement::Expression(expr) => {
                let ty = self.emit_expr(expr)?;
                if ty.is_void() {
                    Ok(())
                } else {
                    self.emit(Instr::Pop)
                }
            }
            BoundStatement::Return(value) => self.emit_return(value.as_ref()),
            BoundStatement::Throw(exception) => {
                self.emit_value(exception, Ty::Value, "thrown expression")?;
                self.emit(Instr::Throw)
            }
            BoundStatement::FunctionDecl(name) => {
                self.emit_declaration(*name, RuntimeFn::DeclareFunction)
            }
            BoundStatement::TypeDecl(name) => self.emit_declaration(*name, RuntimeFn::DeclareType),
            BoundStatement::Global(local) => self.emit_global(*local),
            BoundStatement::GlobalConst { name, value } => {
                self.emit(Instr::LoadContext)?;
                self.emit(Instr::ConstStr(*name))?;
                self.emit_value(value, Ty::Value, "constant value")?;
                self.call_runtime(RuntimeFn::DefineConstant)
            }
            BoundStatement::Static(decl) => self.emit_static(decl),
            BoundStatement::Unset(target) => self.emit_unset(target),
            BoundStatement::Yield(stmt) => self.emit_yield(stmt),
            BoundStatement::Declare => Ok(()),
        }
    }

    fn emit_return(&mut self, value: Option<&BoundExpr>) -> Result<(), LowerError> {
        let stack = match value {
            Some(expr) => self.emit_expr(expr)?,
            None => Ty::Void,
        };
        if self.proc.is_generator() {
            self.emit_generator_return(stack)
        } else {
            self.emit_tmp_ret(stack)
        }
    }

    /// `ctx.Declare*(name)` for a conditionally declared function or class.
    fn emit_declaration(&mut self, name: Name, helper: RuntimeFn) -> Result<(), LowerError> {
        self.emit(Instr::LoadContext)?;
        self.emit(Instr::ConstStr(name))?;
        self.call_runtime(helper)
    }

    /// `global $x;` binds the local to the global variable's storage.
    fn emit_global(&mut self, local: LocalId) -> Result<(), LowerError> {
        let var = self.local(local)?;
        let place = self.place_of(local)?;
        self.emit_store_prepare(place)?;
        self.emit(Instr::LoadContext)?;
        self.emit(Instr::ConstStr(var.name))?;
        self.call_runtime(RuntimeFn::GlobalRef)?;
        self.emit_store(place)
    }

    /// `static $x = init;`
    ///
    /// ```text
    ///     x = StaticHolder(ctx, key)
    ///     if StaticIsInitialized(x) goto done
    ///     StaticInitialize(x, init)
    /// done:
    /// ```
    fn emit_static(&mut self, decl: &StaticVarDecl) -> Result<(), LowerError> {
        let place = self.place_of(decl.var)?;
        self.emit_store_prepare(place)?;
        self.emit(Instr::LoadContext)?;
        self.emit(Instr::ConstStr(decl.key))?;
        self.call_runtime(RuntimeFn::StaticHolder)?;
        self.emit_store(place)?;

        let Some(init) = &decl.initializer else {
            return Ok(());
        };
        let done = self.labels.new_label();
        self.emit_load_var(decl.var)?;
        self.call_runtime(RuntimeFn::StaticIsInitialized)?;
        self.emit(Instr::BranchIf {
            when: true,
            target: done,
        })?;
        self.emit_load_var(decl.var)?;
        self.emit_value(init, Ty::Value, "static initializer")?;
        self.call_runtime(RuntimeFn::StaticInitialize)?;
        self.place_forward_label(done)
    }

    fn emit_unset(&mut self, target: &RefExpr) -> Result<(), LowerError> {
        match target {
            RefExpr::Local(local) => self.emit_unset_var(*local),
            RefExpr::Item { array, key } => {
                self.emit_value(array, Ty::Array, "unset array")?;
                self.emit_value(key, Ty::Value, "unset key")?;
                self.call_runtime(RuntimeFn::RemoveKey)
            }
            RefExpr::Property { instance, name } => {
                self.emit_value(instance, Ty::Value, "unset instance")?;
                self.emit(Instr::ConstStr(*name))?;
                self.call_runtime(RuntimeFn::UnsetProperty)
            }
        }
    }

    /// Publish the yielded value, then suspend.
    fn emit_yield(&mut self, stmt: &YieldStmt) -> Result<(), LowerError> {
        let index = stmt.index;
        if !self.proc.is_generator() {
            return Err(LowerError::YieldOutsideGenerator { index });
        }
        if index < 1 {
            return Err(LowerError::NonPositiveYieldIndex { index });
        }

        self.emit_value(&stmt.value, Ty::Value, "yielded value")?;
        match (&stmt.key, stmt.is_yield_from) {
            (Some(key), delegated) => {
                self.emit_value(key, Ty::Value, "yielded key")?;
                self.call_runtime(if delegated {
                    RuntimeFn::SetGeneratorCurrentDelegated
                } else {
                    RuntimeFn::SetGeneratorCurrentWithKey
                })?;
            }
            (None, true) => {
                self.emit(Instr::ConstNull)?;
                self.call_runtime(RuntimeFn::SetGeneratorCurrentDelegated)?;
            }
            (None, false) => self.call_runtime(RuntimeFn::SetGeneratorCurrent)?,
        }

        self.emit_suspend(index)
    }
}
