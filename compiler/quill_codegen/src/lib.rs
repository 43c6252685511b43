//! Quill stack-machine code generation.
//!
//! Lowers a bound [`Procedure`] (a control-flow graph of basic blocks
//! holding bound statements) into a linear stream of abstract
//! stack-machine [`Instr`]uctions.
//!
//! # Pipeline
//!
//! ```text
//! Procedure → order blocks → prologue → statements + edges per block → Exit epilogue
//!                                                             ↓
//!                                                   InstrSink / MethodBody
//! ```
//!
//! # Design
//!
//! - **Single epilogue**: every `return` stages its value in one shared
//!   temporary and branches to the Exit block, which owns the only value
//!   return.
//! - **Explicit generator state machine**: a generator is one integer
//!   state slot plus a jump table over its yield indices; no native
//!   coroutine support is needed from the target.
//! - **Pluggable block order**: [`EmitOrder`] strategies decide layout;
//!   correctness never depends on it.
//! - **Scoped pools**: labels and temporaries are per procedure and
//!   checked for leaks when the procedure is done.
//!
//! # Entry points
//!
//! - [`lower_procedure`]: one procedure into a [`MethodBody`].
//! - [`lower_procedure_into`]: one procedure into any [`InstrSink`], with
//!   a custom [`EmitOrder`].
//! - [`lower_module`]: many independent procedures in parallel.

mod emitter;
mod error;
mod instr;
mod labels;
mod options;
mod order;
mod sink;
mod stack;
mod temps;
pub mod verify;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

use quill_bound::Procedure;
use rayon::prelude::*;

pub use emitter::GeneratorState;
pub use error::LowerError;
pub use instr::{Callee, Instr, InstrDisplay, Label, RuntimeFn, TempSlot};
pub use options::EmitOptions;
pub use order::{BlockOrder, ByOrdinal, EmitOrder, ReversePostorder};
pub use sink::{EmitSummary, InstrBuffer, InstrSink, MethodBody};
pub use stack::ensure_sufficient_stack;
pub use verify::verify_body;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber driven by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Lower one procedure into a [`MethodBody`].
///
/// Uses the block order selected by `options` and, when
/// `options.verify` is set, re-checks the result with [`verify_body`].
pub fn lower_procedure(proc: &Procedure, options: &EmitOptions) -> Result<MethodBody, LowerError> {
    let mut buffer = InstrBuffer::new();
    let summary = lower_procedure_into(proc, options, options.order.strategy(), &mut buffer)?;
    let body = MethodBody::new(proc.name, buffer.into_vec(), summary);

    if options.verify {
        verify_body(&body).inspect_err(|e| {
            tracing::error!(
                procedure = proc.name.raw(),
                error = %e,
                "lowered body failed verification"
            );
        })?;
    }
    Ok(body)
}

/// Lower one procedure into `sink`, laying blocks out with `order`.
///
/// Instructions are appended; anything already in the sink is left
/// alone. On error the sink may hold a partial stream.
pub fn lower_procedure_into(
    proc: &Procedure,
    options: &EmitOptions,
    order: &dyn EmitOrder,
    sink: &mut dyn InstrSink,
) -> Result<EmitSummary, LowerError> {
    emitter::Emitter::new(proc, options, sink)
        .run(order)
        .inspect_err(|e| {
            tracing::error!(procedure = proc.name.raw(), error = %e, "lowering failed");
        })
}

/// Lower independent procedures in parallel.
///
/// Each procedure gets its own driver state. Results keep input order.
pub fn lower_module(
    procs: &[Procedure],
    options: &EmitOptions,
) -> Vec<Result<MethodBody, LowerError>> {
    tracing::debug!(procedures = procs.len(), "lowering module");
    procs
        .par_iter()
        .map(|proc| lower_procedure(proc, options))
        .collect()
}
