//! Abstract stack-machine instruction set.
//!
//! This is the contract between the lowering engine and the instruction
//! sink. It is deliberately small: physical encoding, metadata tokens and
//! file formats belong to the sink, not to lowering.
//!
//! Every instruction knows its stack effect ([`Instr::stack_effect`]) and
//! whether it ends straight-line flow ([`Instr::ends_flow`]); the driver
//! and the verifier both rely on these.

use std::fmt;

use quill_bound::{BinaryOp, LocalId, Name, Span, StringInterner, Ty};
use smallvec::SmallVec;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Branch target within one method body.
///
/// Labels are numbered per procedure from 0; numbering never leaks
/// across procedures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Label(u32);

impl Label {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Temporary storage slot, checked out of the temporary pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TempSlot(u32);

impl TempSlot {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Call targets ────────────────────────────────────────────────────

/// Runtime helper invoked by lowered code.
///
/// Helpers that need the runtime context take it as their first
/// argument (pushed with [`Instr::LoadContext`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RuntimeFn {
    /// `(ctx, name)`: register a conditionally declared function.
    DeclareFunction,
    /// `(ctx, name)`: register a conditionally declared class.
    DeclareType,
    /// `(ctx, name, value)`: define a global constant.
    DefineConstant,
    /// `(ctx, name) -> ref`: reference to a global variable's storage.
    GlobalRef,
    /// `(ctx, key) -> holder`: static variable holder for a storage key.
    StaticHolder,
    /// `(holder) -> bool`
    StaticIsInitialized,
    /// `(holder, value)`: store the initial value and flag the holder.
    StaticInitialize,
    /// `(array, key) -> value`
    ArrayGet,
    /// `(array, key, value)`
    ArraySet,
    /// `(array, key)`
    RemoveKey,
    /// `(instance, name)`
    UnsetProperty,
    /// `(value)`: publish the generator's current value.
    SetGeneratorCurrent,
    /// `(value, key)`: publish the generator's current value and key.
    SetGeneratorCurrentWithKey,
    /// `(value, key)`: publish a value delegated by `yield from`; the
    /// generator's auto-increment key is left alone.
    SetGeneratorCurrentDelegated,
    /// `(value)`: record the generator's return value.
    SetGeneratorReturn,
    /// `(ctx, script)`: mark a script file as included.
    OnInclude,
    /// `(capacity) -> array`: fresh locals array.
    NewLocalsArray,
    /// `(locals, name) -> handle`: debugger view of an indirect local.
    IndirectLocal,
    /// `(value)`: debug-build assertion that `value` is not null.
    DebugAssertNotNull,
}

impl RuntimeFn {
    /// Number of stack arguments the helper consumes.
    pub fn arity(self) -> u32 {
        match self {
            RuntimeFn::StaticIsInitialized
            | RuntimeFn::SetGeneratorCurrent
            | RuntimeFn::SetGeneratorReturn
            | RuntimeFn::NewLocalsArray
            | RuntimeFn::DebugAssertNotNull => 1,
            RuntimeFn::DeclareFunction
            | RuntimeFn::DeclareType
            | RuntimeFn::GlobalRef
            | RuntimeFn::StaticHolder
            | RuntimeFn::StaticInitialize
            | RuntimeFn::ArrayGet
            | RuntimeFn::RemoveKey
            | RuntimeFn::UnsetProperty
            | RuntimeFn::SetGeneratorCurrentWithKey
            | RuntimeFn::SetGeneratorCurrentDelegated
            | RuntimeFn::OnInclude
            | RuntimeFn::IndirectLocal => 2,
            RuntimeFn::DefineConstant | RuntimeFn::ArraySet => 3,
        }
    }

    /// Whether the helper pushes a result.
    pub fn returns_value(self) -> bool {
        matches!(
            self,
            RuntimeFn::GlobalRef
                | RuntimeFn::StaticHolder
                | RuntimeFn::StaticIsInitialized
                | RuntimeFn::ArrayGet
                | RuntimeFn::NewLocalsArray
                | RuntimeFn::IndirectLocal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeFn::DeclareFunction => "DeclareFunction",
            RuntimeFn::DeclareType => "DeclareType",
            RuntimeFn::DefineConstant => "DefineConstant",
            RuntimeFn::GlobalRef => "GlobalRef",
            RuntimeFn::StaticHolder => "StaticHolder",
            RuntimeFn::StaticIsInitialized => "StaticIsInitialized",
            RuntimeFn::StaticInitialize => "StaticInitialize",
            RuntimeFn::ArrayGet => "ArrayGet",
            RuntimeFn::ArraySet => "ArraySet",
            RuntimeFn::RemoveKey => "RemoveKey",
            RuntimeFn::UnsetProperty => "UnsetProperty",
            RuntimeFn::SetGeneratorCurrent => "SetGeneratorCurrent",
            RuntimeFn::SetGeneratorCurrentWithKey => "SetGeneratorCurrentWithKey",
            RuntimeFn::SetGeneratorCurrentDelegated => "SetGeneratorCurrentDelegated",
            RuntimeFn::SetGeneratorReturn => "SetGeneratorReturn",
            RuntimeFn::OnInclude => "OnInclude",
            RuntimeFn::NewLocalsArray => "NewLocalsArray",
            RuntimeFn::IndirectLocal => "IndirectLocal",
            RuntimeFn::DebugAssertNotNull => "DebugAssertNotNull",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Callee {
    /// A user function, resolved by the sink.
    Function(Name),
    Runtime(RuntimeFn),
}

// ── Instructions ────────────────────────────────────────────────────

/// A single stack-machine instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Instr {
    Nop,

    // ── Constants ───────────────────────────────────────────────
    ConstInt(i64),
    /// IEEE bits of an `f64`.
    ConstFloat(u64),
    ConstBool(bool),
    ConstStr(Name),
    ConstNull,

    // ── Storage ─────────────────────────────────────────────────
    LoadLocal(LocalId),
    StoreLocal(LocalId),
    /// Reset a local to its unbound state.
    ClearLocal(LocalId),
    LoadTemp(TempSlot),
    StoreTemp(TempSlot),
    /// Push the runtime context.
    LoadContext,
    /// Push the current generator state (`i32`).
    LoadGeneratorState,
    /// Pop an `i32` into the generator state.
    StoreGeneratorState,

    // ── Stack / values ──────────────────────────────────────────
    Pop,
    Dup,
    Convert { from: Ty, to: Ty },
    Binary(BinaryOp),
    Call { callee: Callee, argc: u32, returns: bool },
    New { class: Name, argc: u32 },

    // ── Control flow ────────────────────────────────────────────
    Branch(Label),
    /// Pop a bool; branch when it equals `when`.
    BranchIf { when: bool, target: Label },
    /// Pop an integer key; jump to the matching case or to `default`.
    Switch {
        cases: Vec<(i64, Label)>,
        default: Label,
    },
    Return { with_value: bool },
    Throw,
    /// Open a protected region whose handler starts at `handler`.
    EnterTry { handler: Label },
    /// Close the innermost protected region and branch.
    Leave(Label),

    // ── Pseudo-instructions ─────────────────────────────────────
    MarkLabel(Label),
    AllocTemp { slot: TempSlot, ty: Ty },
    FreeTemp(TempSlot),
    SequencePoint(Span),
    /// Sequence point the debugger steps over.
    HiddenSequencePoint,
}

impl Instr {
    /// `(pops, pushes)` on the evaluation stack.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Instr::Nop
            | Instr::ClearLocal(_)
            | Instr::Branch(_)
            | Instr::EnterTry { .. }
            | Instr::Leave(_)
            | Instr::MarkLabel(_)
            | Instr::AllocTemp { .. }
            | Instr::FreeTemp(_)
            | Instr::SequencePoint(_)
            | Instr::HiddenSequencePoint => (0, 0),

            Instr::ConstInt(_)
            | Instr::ConstFloat(_)
            | Instr::ConstBool(_)
            | Instr::ConstStr(_)
            | Instr::ConstNull
            | Instr::LoadLocal(_)
            | Instr::LoadTemp(_)
            | Instr::LoadContext
            | Instr::LoadGeneratorState => (0, 1),

            Instr::StoreLocal(_)
            | Instr::StoreTemp(_)
            | Instr::StoreGeneratorState
            | Instr::Pop
            | Instr::BranchIf { .. }
            | Instr::Switch { .. }
            | Instr::Throw => (1, 0),

            Instr::Dup => (1, 2),
            Instr::Convert { .. } => (1, 1),
            Instr::Binary(_) => (2, 1),
            Instr::Call { argc, returns, .. } => (*argc as usize, usize::from(*returns)),
            Instr::New { argc, .. } => (*argc as usize, 1),
            Instr::Return { with_value } => (usize::from(*with_value), 0),
        }
    }

    /// Short opcode name for diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::Nop => "nop",
            Instr::ConstInt(_) => "const.i",
            Instr::ConstFloat(_) => "const.f",
            Instr::ConstBool(_) => "const.b",
            Instr::ConstStr(_) => "const.s",
            Instr::ConstNull => "const.null",
            Instr::LoadLocal(_) => "ldloc",
            Instr::StoreLocal(_) => "stloc",
            Instr::ClearLocal(_) => "clrloc",
            Instr::LoadTemp(_) => "ldtmp",
            Instr::StoreTemp(_) => "sttmp",
            Instr::LoadContext => "ldctx",
            Instr::LoadGeneratorState => "ldstate",
            Instr::StoreGeneratorState => "ststate",
            Instr::Pop => "pop",
            Instr::Dup => "dup",
            Instr::Convert { .. } => "conv",
            Instr::Binary(_) => "binop",
            Instr::Call { .. } => "call",
            Instr::New { .. } => "new",
            Instr::Branch(_) => "br",
            Instr::BranchIf { when: true, .. } => "brtrue",
            Instr::BranchIf { when: false, .. } => "brfalse",
            Instr::Switch { .. } => "switch",
            Instr::Return { with_value: true } => "ret.v",
            Instr::Return { with_value: false } => "ret",
            Instr::Throw => "throw",
            Instr::EnterTry { .. } => "try",
            Instr::Leave(_) => "leave",
            Instr::MarkLabel(_) => "label",
            Instr::AllocTemp { .. } => ".temp",
            Instr::FreeTemp(_) => ".free",
            Instr::SequencePoint(_) | Instr::HiddenSequencePoint => ".line",
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Instr::Branch(_)
                | Instr::Switch { .. }
                | Instr::Return { .. }
                | Instr::Throw
                | Instr::Leave(_)
        )
    }

    /// Pseudo-instructions that are bookkeeping for the sink rather than
    /// executable code. They are kept even in unreachable regions.
    pub fn is_bookkeeping(&self) -> bool {
        matches!(
            self,
            Instr::MarkLabel(_) | Instr::AllocTemp { .. } | Instr::FreeTemp(_)
        )
    }

    /// Labels this instruction may transfer control to.
    pub fn branch_targets(&self) -> SmallVec<[Label; 2]> {
        match self {
            Instr::Branch(label)
            | Instr::BranchIf { target: label, .. }
            | Instr::Leave(label)
            | Instr::EnterTry { handler: label } => smallvec::smallvec![*label],
            Instr::Switch { cases, default } => {
                let mut targets = SmallVec::with_capacity(cases.len() + 1);
                targets.extend(cases.iter().map(|&(_, l)| l));
                targets.push(*default);
                targets
            }
            _ => SmallVec::new(),
        }
    }

    /// Render with names resolved through `interner`.
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> InstrDisplay<'a> {
        InstrDisplay {
            instr: self,
            interner,
        }
    }
}

/// [`Instr`] formatter that resolves interned names.
pub struct InstrDisplay<'a> {
    instr: &'a Instr,
    interner: &'a StringInterner,
}

impl fmt::Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |n: Name| self.interner.lookup(n);
        match self.instr {
            Instr::Nop => write!(f, "nop"),
            Instr::ConstInt(v) => write!(f, "const.i {v}"),
            Instr::ConstFloat(bits) => write!(f, "const.f {}", f64::from_bits(*bits)),
            Instr::ConstBool(v) => write!(f, "const.b {v}"),
            Instr::ConstStr(s) => write!(f, "const.s {:?}", name(*s)),
            Instr::ConstNull => write!(f, "const.null"),
            Instr::LoadLocal(l) => write!(f, "ldloc {}", l.raw()),
            Instr::StoreLocal(l) => write!(f, "stloc {}", l.raw()),
            Instr::ClearLocal(l) => write!(f, "clrloc {}", l.raw()),
            Instr::LoadTemp(t) => write!(f, "ldtmp {}", t.raw()),
            Instr::StoreTemp(t) => write!(f, "sttmp {}", t.raw()),
            Instr::LoadContext => write!(f, "ldctx"),
            Instr::LoadGeneratorState => write!(f, "ldstate"),
            Instr::StoreGeneratorState => write!(f, "ststate"),
            Instr::Pop => write!(f, "pop"),
            Instr::Dup => write!(f, "dup"),
            Instr::Convert { from, to } => write!(f, "conv {from:?} -> {to:?}"),
            Instr::Binary(op) => write!(f, "binop {}", op.as_str()),
            Instr::Call {
                callee,
                argc,
                returns,
            } => {
                let target = match callee {
                    Callee::Function(n) => name(*n),
                    Callee::Runtime(r) => r.as_str(),
                };
                let suffix = if *returns { "" } else { " void" };
                write!(f, "call {target}/{argc}{suffix}")
            }
            Instr::New { class, argc } => write!(f, "new {}/{argc}", name(*class)),
            Instr::Branch(l) => write!(f, "br L{}", l.raw()),
            Instr::BranchIf { when, target } => {
                let op = if *when { "brtrue" } else { "brfalse" };
                write!(f, "{op} L{}", target.raw())
            }
            Instr::Switch { cases, default } => {
                write!(f, "switch [")?;
                for (i, (key, label)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} => L{}", label.raw())?;
                }
                write!(f, "] else L{}", default.raw())
            }
            Instr::Return { with_value: true } => write!(f, "ret.v"),
            Instr::Return { with_value: false } => write!(f, "ret"),
            Instr::Throw => write!(f, "throw"),
            Instr::EnterTry { handler } => write!(f, "try -> L{}", handler.raw()),
            Instr::Leave(l) => write!(f, "leave L{}", l.raw()),
            Instr::MarkLabel(l) => write!(f, "L{}:", l.raw()),
            Instr::AllocTemp { slot, ty } => write!(f, ".temp {} : {ty:?}", slot.raw()),
            Instr::FreeTemp(slot) => write!(f, ".free {}", slot.raw()),
            Instr::SequencePoint(span) => write!(f, ".line {span}"),
            Instr::HiddenSequencePoint => write!(f, ".line hidden"),
        }
    }
}

#[cfg(test)]
mod tests;
