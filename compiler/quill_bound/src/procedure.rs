//! Procedure descriptors: everything the backend knows about one routine.

use crate::{ControlFlowGraph, Name, Span, Ty};

/// Local variable ID within a procedure.
///
/// IDs index into the procedure's [`LocalsTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct LocalId(u32);

impl LocalId {
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

/// How a variable came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarKind {
    Parameter,
    /// The implicit `$this`.
    This,
    /// A user-declared local.
    Local,
    /// A compiler-introduced temporary.
    Temporary,
    /// `$_GET`, `$GLOBALS` and friends.
    SuperGlobal,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalVar {
    pub id: LocalId,
    /// Source name; `Name::EMPTY` for unnamed temporaries.
    pub name: Name,
    pub ty: Ty,
    pub kind: VarKind,
}

impl LocalVar {
    /// Whether the prologue gives this variable its default value.
    pub fn needs_init(&self) -> bool {
        matches!(self.kind, VarKind::Local | VarKind::Temporary)
    }
}

/// The procedure's variables, indexed by [`LocalId`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocalsTable {
    vars: Vec<LocalVar>,
}

impl LocalsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable and return its ID.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "local counts never exceed u32"
    )]
    pub fn declare(&mut self, name: Name, ty: Ty, kind: VarKind) -> LocalId {
        let id = LocalId::new(self.vars.len() as u32);
        self.vars.push(LocalVar { id, name, ty, kind });
        id
    }

    pub fn get(&self, id: LocalId) -> Option<&LocalVar> {
        self.vars.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVar> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    Function,
    Method,
    /// The implicit main routine of a script file.
    ScriptMain { script: Name },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProcedureFlags {
    /// Suspendable: lowered into a resumable state machine.
    pub is_generator: bool,
    pub is_static: bool,
    /// Locals were already initialized by the caller (e.g. an
    /// `include`d script sharing its includer's locals).
    pub locals_initialized: bool,
}

/// One routine ready for lowering.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Procedure {
    pub name: Name,
    pub kind: ProcedureKind,
    pub return_type: Ty,
    pub locals: LocalsTable,
    pub cfg: ControlFlowGraph,
    pub flags: ProcedureFlags,
    /// Span of the body, braces included.
    pub body_span: Option<Span>,
    /// When set, variables live indirectly in a runtime locals array held
    /// by this local instead of in their own slots.
    pub locals_array: Option<LocalId>,
}

impl Procedure {
    pub fn new(name: Name, return_type: Ty, locals: LocalsTable, cfg: ControlFlowGraph) -> Self {
        Procedure {
            name,
            kind: ProcedureKind::Function,
            return_type,
            locals,
            cfg,
            flags: ProcedureFlags::default(),
            body_span: None,
            locals_array: None,
        }
    }

    #[inline]
    pub fn is_generator(&self) -> bool {
        self.flags.is_generator
    }

    #[must_use]
    pub fn generator(mut self) -> Self {
        self.flags.is_generator = true;
        self
    }
}
