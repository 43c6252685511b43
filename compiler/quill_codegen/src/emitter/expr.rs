//! Expression lowering.
//!
//! Expressions are trees, so lowering recurses; every level goes through
//! [`ensure_sufficient_stack`] so deeply nested input cannot overflow.

use quill_bound::{BoundExpr, ExprKind, Literal, Ty};

use crate::error::LowerError;
use crate::instr::{Callee, Instr, RuntimeFn};
use crate::stack::ensure_sufficient_stack;

use super::place::VarPlace;
use super::Emitter;

impl Emitter<'_> {
    /// Lower `expr`, leaving its value (if any) on the stack.
    ///
    /// Returns the type of what was pushed; `Ty::Void` means nothing.
    pub(super) fn emit_expr(&mut self, expr: &BoundExpr) -> Result<Ty, LowerError> {
        ensure_sufficient_stack(|| self.emit_expr_inner(expr))
    }

    fn emit_expr_inner(&mut self, expr: &BoundExpr) -> Result<Ty, LowerError> {
        match &expr.kind {
            ExprKind::Literal(lit) => self.emit_literal(*lit)?,
            ExprKind::Local(local) => self.emit_load_var(*local)?,
            ExprKind::Assign { target, value } => {
                let var = self.local(*target)?;
                let place = self.place_of(*target)?;
                self.emit_store_prepare(place)?;
                self.emit_value(value, var.ty, "assigned value")?;
                match place {
                    _ if expr.ty.is_void() => self.emit_store(place)?,
                    VarPlace::Slot(_) => {
                        self.emit(Instr::Dup)?;
                        self.emit_store(place)?;
                        self.emit_convert(var.ty, expr.ty)?;
                    }
                    // The array and key sit under the value; read it back.
                    VarPlace::Indirect { .. } => {
                        self.emit_store(place)?;
                        self.emit_load_var(*target)?;
                        self.emit_convert(var.ty, expr.ty)?;
                    }
                }
                return Ok(expr.ty);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_operand(lhs, "left operand")?;
                self.emit_operand(rhs, "right operand")?;
                self.emit(Instr::Binary(*op))?;
            }
            ExprKind::Call { func, args } => {
                let argc = self.emit_args(args)?;
                self.emit(Instr::Call {
                    callee: Callee::Function(*func),
                    argc,
                    returns: !expr.ty.is_void(),
                })?;
                return Ok(expr.ty);
            }
            ExprKind::New { class, args } => {
                let argc = self.emit_args(args)?;
                self.emit(Instr::New {
                    class: *class,
                    argc,
                })?;
            }
            ExprKind::Item { array, key } => {
                self.emit_value(array, Ty::Array, "indexed array")?;
                self.emit_value(key, Ty::Value, "array key")?;
                self.call_runtime(RuntimeFn::ArrayGet)?;
            }
        }
        // These kinds push exactly one value whatever the binder typed them.
        Ok(if expr.ty.is_void() { Ty::Value } else { expr.ty })
    }

    /// Lower `expr` and convert its value to `to`.
    ///
    /// `context` names the operand in the error raised when `expr`
    /// produces nothing.
    pub(super) fn emit_value(
        &mut self,
        expr: &BoundExpr,
        to: Ty,
        context: &'static str,
    ) -> Result<(), LowerError> {
        let ty = self.emit_operand(expr, context)?;
        self.emit_convert(ty, to)
    }

    /// Lower `expr`, which must produce a value, without converting it.
    fn emit_operand(&mut self, expr: &BoundExpr, context: &'static str) -> Result<Ty, LowerError> {
        let ty = self.emit_expr(expr)?;
        if ty.is_void() {
            return Err(LowerError::MissingValue { context });
        }
        Ok(ty)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "argument counts never exceed u32"
    )]
    fn emit_args(&mut self, args: &[BoundExpr]) -> Result<u32, LowerError> {
        for arg in args {
            self.emit_operand(arg, "call argument")?;
        }
        Ok(args.len() as u32)
    }

    /// Convert the value on top of the stack from `from` to `to`.
    ///
    /// Converting to `Void` discards the value.
    pub(super) fn emit_convert(&mut self, from: Ty, to: Ty) -> Result<(), LowerError> {
        if from == to {
            return Ok(());
        }
        if from.is_void() {
            return Err(LowerError::MissingValue {
                context: "conversion source",
            });
        }
        if to.is_void() {
            return self.emit(Instr::Pop);
        }
        self.emit(Instr::Convert { from, to })
    }

    pub(super) fn emit_literal(&mut self, lit: Literal) -> Result<(), LowerError> {
        self.emit(match lit {
            Literal::Int(v) => Instr::ConstInt(v),
            Literal::Float(bits) => Instr::ConstFloat(bits),
            Literal::Bool(v) => Instr::ConstBool(v),
            Literal::Str(s) => Instr::ConstStr(s),
            Literal::Null => Instr::ConstNull,
        })
    }
}
