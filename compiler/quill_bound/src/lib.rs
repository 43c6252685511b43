//! Quill bound IR: the input side of the stack backend.
//!
//! The binder hands the backend one [`Procedure`] per routine: its
//! locals, its declared return type, and a [`ControlFlowGraph`] of
//! [`BasicBlock`]s whose statements are [`BoundStatement`]s. Nothing here
//! knows about instructions; `quill_codegen` consumes these types
//! read-only.
//!
//! # Design
//!
//! - **Closed sum types**: statements, expressions and edges are enums so
//!   every consumer matches exhaustively.
//! - **Arena graph**: blocks live in one `Vec` indexed by [`BlockId`];
//!   emission order is derived, never stored.
//! - **Interned names**: identifiers are [`Name`]s from a shared
//!   [`StringInterner`].
//!
//! Types that contain floats store them as `u64` bits for `Hash`.

mod builder;
mod expr;
pub mod graph;
mod interner;
mod name;
mod procedure;
mod span;
mod stmt;
mod ty;

pub use builder::CfgBuilder;
pub use expr::{BinaryOp, BoundExpr, ExprKind, Literal, RefExpr};
pub use graph::{BasicBlock, BlockId, BlockKind, ControlFlowGraph, Edge, GraphError, YieldSite};
pub use interner::{InternError, StringInterner};
pub use name::Name;
pub use procedure::{
    LocalId, LocalVar, LocalsTable, Procedure, ProcedureFlags, ProcedureKind, VarKind,
};
pub use span::Span;
pub use stmt::{BoundStatement, StaticVarDecl, YieldStmt};
pub use ty::Ty;
