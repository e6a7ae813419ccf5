//! Semantic type system for the C front-end.
//!
//! Types are produced by the semantic analyzer and consumed read-only by
//! lowering. All `TypeRef` creation goes through the [`TypeRegistry`], which
//! canonicalizes derived types and answers target-dependent layout queries.

pub mod type_registry;
pub mod types;

pub use type_registry::TypeRegistry;
pub use types::{ArraySizeType, Type, TypeKind, TypeQualifiers, TypeRef};
