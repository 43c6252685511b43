//! Bound expressions.
//!
//! Expression lowering itself is not the backend's main concern, but the
//! statements it lowers carry expressions, so a compact expression set is
//! modelled here: literals, locals, assignment, binary operators, calls,
//! object creation and array item reads.

use crate::{LocalId, Name, Span, Ty};

/// Literal constant.
///
/// Floats are stored as their IEEE bits so the type stays `Eq + Hash`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
    Int(i64),
    Float(u64),
    Bool(bool),
    Str(Name),
    Null,
}

impl Literal {
    /// The type a literal of this kind evaluates to.
    pub fn ty(self) -> Ty {
        match self {
            Literal::Int(_) => Ty::Int,
            Literal::Float(_) => Ty::Float,
            Literal::Bool(_) => Ty::Bool,
            Literal::Str(_) => Ty::String,
            Literal::Null => Ty::Null,
        }
    }
}

/// Binary operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => ".",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A bound expression with the type of the value it produces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundExpr {
    pub kind: ExprKind,
    /// Binder-computed result type. `Ty::Void` means no value is produced.
    pub ty: Ty,
    pub span: Option<Span>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal(Literal),
    Local(LocalId),
    /// `target = value`; evaluates to the assigned value.
    Assign {
        target: LocalId,
        value: Box<BoundExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<BoundExpr>,
        rhs: Box<BoundExpr>,
    },
    /// Direct call of a user function.
    Call { func: Name, args: Vec<BoundExpr> },
    /// `new class(args...)`.
    New { class: Name, args: Vec<BoundExpr> },
    /// `array[key]` read.
    Item {
        array: Box<BoundExpr>,
        key: Box<BoundExpr>,
    },
}

impl BoundExpr {
    pub fn new(kind: ExprKind, ty: Ty) -> Self {
        BoundExpr {
            kind,
            ty,
            span: None,
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn literal(lit: Literal) -> Self {
        BoundExpr::new(ExprKind::Literal(lit), lit.ty())
    }

    pub fn int(value: i64) -> Self {
        BoundExpr::literal(Literal::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        BoundExpr::literal(Literal::Bool(value))
    }

    pub fn str(value: Name) -> Self {
        BoundExpr::literal(Literal::Str(value))
    }

    pub fn null() -> Self {
        BoundExpr::literal(Literal::Null)
    }

    pub fn local(id: LocalId, ty: Ty) -> Self {
        BoundExpr::new(ExprKind::Local(id), ty)
    }

    pub fn call(func: Name, args: Vec<BoundExpr>, ty: Ty) -> Self {
        BoundExpr::new(ExprKind::Call { func, args }, ty)
    }

    pub fn binary(op: BinaryOp, lhs: BoundExpr, rhs: BoundExpr, ty: Ty) -> Self {
        BoundExpr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    pub fn assign(target: LocalId, value: BoundExpr, ty: Ty) -> Self {
        BoundExpr::new(
            ExprKind::Assign {
                target,
                value: Box::new(value),
            },
            ty,
        )
    }
}

/// A reference expression: something that can be unset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RefExpr {
    Local(LocalId),
    /// `unset($array[$key])`.
    Item { array: BoundExpr, key: BoundExpr },
    /// `unset($obj->name)`.
    Property { instance: BoundExpr, name: Name },
}
