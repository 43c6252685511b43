//! Lowering options.

use crate::order::BlockOrder;

/// Knobs for one lowering run.
///
/// `Default` gives release settings: no debug-only code, no sequence
/// points, ascending-ordinal block order, and stream verification only
/// in debug builds of the compiler itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmitOptions {
    /// Emit debug-build code: context assertions, the opening-brace
    /// sequence point and debugger shadow locals.
    pub debug: bool,
    /// Emit sequence points for statements.
    pub sequence_points: bool,
    pub order: BlockOrder,
    /// Re-check every lowered body with [`verify_body`](crate::verify_body).
    pub verify: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            debug: false,
            sequence_points: false,
            order: BlockOrder::Ordinal,
            verify: cfg!(debug_assertions),
        }
    }
}

impl EmitOptions {
    /// Debug-build settings with sequence points and verification on.
    pub fn debug() -> Self {
        EmitOptions {
            debug: true,
            sequence_points: true,
            order: BlockOrder::Ordinal,
            verify: true,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: BlockOrder) -> Self {
        self.order = order;
        self
    }
}
