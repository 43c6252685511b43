//! Types as seen by the backend.
//!
//! The binder's type system is much richer; lowering only needs to know
//! which storage class a value has and what its default is.

use crate::{Literal, Name};

/// Lowering-relevant type of a value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Ty {
    /// No value. Expressions of this type leave nothing on the stack.
    Void,
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    /// Dynamically typed value.
    Value,
    /// Instance of a named class.
    Object(Name),
}

impl Ty {
    #[inline]
    pub fn is_void(self) -> bool {
        matches!(self, Ty::Void)
    }

    /// Whether a value of this type occupies a stack slot.
    #[inline]
    pub fn has_value(self) -> bool {
        !self.is_void()
    }

    /// The literal a fresh slot of this type holds, or `None` for `Void`.
    ///
    /// Reference-like types (`Null`, `Array`, `Value`, `Object`) default
    /// to null.
    pub fn default_value(self) -> Option<Literal> {
        match self {
            Ty::Void => None,
            Ty::Null | Ty::Array | Ty::Value | Ty::Object(_) => Some(Literal::Null),
            Ty::Bool => Some(Literal::Bool(false)),
            Ty::Int => Some(Literal::Int(0)),
            Ty::Float => Some(Literal::Float(0f64.to_bits())),
            Ty::String => Some(Literal::Str(Name::EMPTY)),
        }
    }
}
