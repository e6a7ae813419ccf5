//! Fatal errors reported by the lowering pass.
//!
//! Lowering carries no source locations of its own; unsupported constructs
//! are reported by name and abort the translation unit.

/// Errors that cross the lowering boundary.
///
/// There is no local recovery: the driver treats any of these as a
/// translation-unit failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    /// The input AST contains a construct lowering does not implement yet.
    #[error("unsupported construct: {0}")]
    Unsupported(&'static str),
}
