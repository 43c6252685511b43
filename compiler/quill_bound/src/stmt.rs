//! Bound statements: the closed set of statement kinds the backend lowers.

use crate::{BoundExpr, LocalId, Name, RefExpr, Span};

/// `static $var = init;` declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StaticVarDecl {
    /// Local that is bound to the static storage.
    pub var: LocalId,
    /// Storage identity. Two statements with the same key share one
    /// holder, and the initializer runs once per key.
    pub key: Name,
    pub initializer: Option<BoundExpr>,
}

/// `yield` suspend point.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct YieldStmt {
    /// 1-based ordinal of this yield within the procedure. Zero is
    /// reserved for "not started".
    pub index: i32,
    pub value: BoundExpr,
    pub key: Option<BoundExpr>,
    /// Part of `yield from` delegation; the runtime skips auto-increment
    /// key bookkeeping for these.
    pub is_yield_from: bool,
}

/// A statement in a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BoundStatement {
    /// No-op. The span, when present, gets a sequence point.
    Empty(Option<Span>),
    /// Evaluate and discard.
    Expression(BoundExpr),
    /// `return;` / `return value;`
    Return(Option<BoundExpr>),
    /// `throw value;`
    Throw(BoundExpr),
    /// Conditionally declared function.
    FunctionDecl(Name),
    /// Conditionally declared class.
    TypeDecl(Name),
    /// `global $var;`
    Global(LocalId),
    /// `const NAME = value;` at global scope.
    GlobalConst { name: Name, value: BoundExpr },
    /// `static $var = init;`
    Static(StaticVarDecl),
    /// `unset(ref);`
    Unset(RefExpr),
    Yield(YieldStmt),
    /// `declare(...)` directive; no runtime effect.
    Declare,
}

impl BoundStatement {
    /// Short kind name for logs and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BoundStatement::Empty(_) => "empty",
            BoundStatement::Expression(_) => "expression",
            BoundStatement::Return(_) => "return",
            BoundStatement::Throw(_) => "throw",
            BoundStatement::FunctionDecl(_) => "function-decl",
            BoundStatement::TypeDecl(_) => "type-decl",
            BoundStatement::Global(_) => "global",
            BoundStatement::GlobalConst { .. } => "global-const",
            BoundStatement::Static(_) => "static",
            BoundStatement::Unset(_) => "unset",
            BoundStatement::Yield(_) => "yield",
            BoundStatement::Declare => "declare",
        }
    }

    /// Source span used for the statement's sequence point.
    pub fn span(&self) -> Option<Span> {
        match self {
            BoundStatement::Empty(span) => *span,
            BoundStatement::Expression(e) | BoundStatement::Throw(e) => e.span,
            BoundStatement::Return(e) => e.as_ref().and_then(|e| e.span),
            BoundStatement::GlobalConst { value, .. } => value.span,
            BoundStatement::Yield(y) => y.value.span,
            BoundStatement::FunctionDecl(_)
            | BoundStatement::TypeDecl(_)
            | BoundStatement::Global(_)
            | BoundStatement::Static(_)
            | BoundStatement::Unset(_)
            | BoundStatement::Declare => None,
        }
    }
}
