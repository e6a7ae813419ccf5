//! AST-to-IR lowering for a C11 compiler front-end.

/// Typed, flattened AST produced by the parser and semantic analyzer.
pub mod ast;
/// Fatal error types crossing the lowering boundary.
pub mod diagnostic;
/// The linear intermediate representation and its tooling.
pub mod ir;
/// The AST-to-IR lowering pass.
pub mod lower;
/// Semantic (C) type system and target-dependent layout queries.
pub mod semantic;
