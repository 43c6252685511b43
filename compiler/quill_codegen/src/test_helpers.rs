//! Shared test utilities for lowering tests.
//!
//! Only compiled in test builds.

use quill_bound::{CfgBuilder, LocalsTable, Name, Procedure, Ty};

use crate::instr::{Callee, Instr, Label, RuntimeFn, TempSlot};
use crate::{lower_procedure, EmitOptions, LowerError, MethodBody};

/// Shorthand for `Label::new(n)`.
pub(crate) fn l(n: u32) -> Label {
    Label::new(n)
}

/// Shorthand for `TempSlot::new(n)`.
pub(crate) fn t(n: u32) -> TempSlot {
    TempSlot::new(n)
}

/// Shorthand for `Name::from_raw(n)`.
pub(crate) fn n(raw: u32) -> Name {
    Name::from_raw(raw)
}

/// `Instr::Call` of a runtime helper with its natural signature.
pub(crate) fn rt(helper: RuntimeFn) -> Instr {
    Instr::Call {
        callee: Callee::Runtime(helper),
        argc: helper.arity(),
        returns: helper.returns_value(),
    }
}

/// `Instr::Call` of a user function.
pub(crate) fn call(func: Name, argc: u32, returns: bool) -> Instr {
    Instr::Call {
        callee: Callee::Function(func),
        argc,
        returns,
    }
}

/// Release options with verification on.
pub(crate) fn release() -> EmitOptions {
    EmitOptions {
        verify: true,
        ..EmitOptions::default()
    }
}

/// Build a procedure named `n(1)` from a finished builder.
pub(crate) fn make_proc(return_type: Ty, locals: LocalsTable, builder: CfgBuilder) -> Procedure {
    let cfg = builder
        .finish()
        .unwrap_or_else(|e| panic!("graph rejected: {e}"));
    Procedure::new(n(1), return_type, locals, cfg)
}

/// Lower with `options`, panicking on error.
pub(crate) fn lower_with(proc: &Procedure, options: &EmitOptions) -> MethodBody {
    lower_procedure(proc, options).unwrap_or_else(|e| panic!("lowering failed: {e}"))
}

/// Lower with [`release`] options, panicking on error.
pub(crate) fn lower(proc: &Procedure) -> MethodBody {
    lower_with(proc, &release())
}

/// Lower with [`release`] options, panicking on success.
pub(crate) fn lower_err(proc: &Procedure) -> LowerError {
    match lower_procedure(proc, &release()) {
        Ok(body) => panic!("expected lowering to fail, got {:?}", body.instrs),
        Err(e) => e,
    }
}
