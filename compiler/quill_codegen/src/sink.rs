//! Instruction sinks and lowered method bodies.
//!
//! The driver pushes instructions through [`InstrSink`] and never reads
//! them back. [`InstrBuffer`] is the in-memory sink used by
//! [`lower_procedure`](crate::lower_procedure); encoders for a physical
//! format implement the trait directly.

use std::fmt::{self, Write as _};

use quill_bound::{Name, StringInterner, Ty};

use crate::instr::{Instr, Label, TempSlot};

/// Receiver of emitted instructions.
pub trait InstrSink {
    fn emit(&mut self, instr: Instr);

    /// Number of instructions emitted so far. Label positions are
    /// recorded against this count.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Growable in-memory sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrBuffer {
    instrs: Vec<Instr>,
}

impl InstrBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn into_vec(self) -> Vec<Instr> {
        self.instrs
    }
}

impl InstrSink for InstrBuffer {
    #[inline]
    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    #[inline]
    fn len(&self) -> usize {
        self.instrs.len()
    }
}

impl InstrSink for Vec<Instr> {
    #[inline]
    fn emit(&mut self, instr: Instr) {
        self.push(instr);
    }

    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Per-procedure facts the driver reports after lowering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct EmitSummary {
    /// Instructions pushed to the sink by this procedure.
    pub instr_count: usize,
    /// Type of every temporary slot, indexed by `TempSlot::index()`.
    pub temps: Vec<Ty>,
    pub label_count: u32,
    /// Resume label of every yield, sorted by yield index. Empty for
    /// ordinary procedures.
    pub resume_points: Vec<(i32, Label)>,
    /// Debugger shadow locals: source variable and the slot exposing it.
    pub debug_locals: Vec<(Name, TempSlot)>,
}

/// A fully lowered procedure.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodBody {
    pub name: Name,
    pub instrs: Vec<Instr>,
    pub temps: Vec<Ty>,
    pub label_count: u32,
    pub resume_points: Vec<(i32, Label)>,
    pub debug_locals: Vec<(Name, TempSlot)>,
}

impl MethodBody {
    pub fn new(name: Name, instrs: Vec<Instr>, summary: EmitSummary) -> Self {
        MethodBody {
            name,
            instrs,
            temps: summary.temps,
            label_count: summary.label_count,
            resume_points: summary.resume_points,
            debug_locals: summary.debug_locals,
        }
    }

    pub fn is_generator(&self) -> bool {
        !self.resume_points.is_empty()
    }

    /// Human-readable listing: labels flush left, instructions indented.
    pub fn dump(&self, interner: &StringInterner) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_listing(&mut out, interner);
        out
    }

    fn write_listing(&self, out: &mut String, interner: &StringInterner) -> fmt::Result {
        writeln!(
            out,
            "method {} (temps: {}, labels: {})",
            interner.lookup(self.name),
            self.temps.len(),
            self.label_count
        )?;
        if !self.resume_points.is_empty() {
            write!(out, "  resume:")?;
            for (index, label) in &self.resume_points {
                write!(out, " {index}=L{}", label.raw())?;
            }
            writeln!(out)?;
        }
        for instr in &self.instrs {
            match instr {
                Instr::MarkLabel(_) => writeln!(out, "  {}", instr.display(interner))?,
                _ => writeln!(out, "    {}", instr.display(interner))?,
            }
        }
        Ok(())
    }
}
