//! C type representation.

use bitflags::bitflags;
use serde::Serialize;
use std::fmt::{self, Display};
use std::num::NonZeroU32;
use symbol_table::GlobalSymbol as Symbol;

/// Dense reference to a canonical type in the [`TypeRegistry`].
///
/// [`TypeRegistry`]: crate::semantic::TypeRegistry
pub type TypeRef = NonZeroU32;

/// A canonical C type.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub qualifiers: TypeQualifiers,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            qualifiers: TypeQualifiers::empty(),
        }
    }
}

/// The kind of a C type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Char {
        is_signed: bool,
    },
    Short {
        is_signed: bool,
    },
    Int {
        is_signed: bool,
    },
    Long {
        is_signed: bool,
        is_long_long: bool,
    },
    Float,
    Double {
        is_long_double: bool,
    },
    /// C11 `_Complex`.
    Complex {
        base_type: TypeRef,
    },
    Pointer {
        pointee: TypeRef,
    },
    Array {
        element_type: TypeRef,
        size: ArraySizeType,
    },
    /// GNU `__attribute__((vector_size))` vector.
    Vector {
        element_type: TypeRef,
        len: u32,
    },
    Function {
        return_type: TypeRef,
        parameters: Vec<TypeRef>,
        is_variadic: bool,
    },
    /// Struct or union; layout is not computed here.
    Record {
        tag: Option<Symbol>,
        is_union: bool,
    },
    Enum {
        base_type: TypeRef,
    },
    Error,
}

/// Array size kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySizeType {
    Constant(usize),
    Incomplete,
}

bitflags! {
    /// Type qualifiers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Default)]
    pub struct TypeQualifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const ATOMIC = 1 << 3;
    }
}

impl Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Bool => write!(f, "_Bool"),
            TypeKind::Char { is_signed } => {
                write!(f, "{}char", if *is_signed { "" } else { "unsigned " })
            }
            TypeKind::Short { is_signed } => {
                write!(f, "{}short", if *is_signed { "" } else { "unsigned " })
            }
            TypeKind::Int { is_signed } => {
                write!(f, "{}int", if *is_signed { "" } else { "unsigned " })
            }
            TypeKind::Long {
                is_signed,
                is_long_long,
            } => write!(
                f,
                "{}long{}",
                if *is_signed { "" } else { "unsigned " },
                if *is_long_long { " long" } else { "" }
            ),
            TypeKind::Float => write!(f, "float"),
            TypeKind::Double { is_long_double } => {
                write!(f, "{}double", if *is_long_double { "long " } else { "" })
            }
            TypeKind::Complex { .. } => write!(f, "_Complex"),
            TypeKind::Pointer { .. } => write!(f, "<pointer>"),
            TypeKind::Array { .. } => write!(f, "<array>"),
            TypeKind::Vector { .. } => write!(f, "<vector>"),
            TypeKind::Function { .. } => write!(f, "<function>"),
            TypeKind::Record { tag, is_union } => {
                let kind = if *is_union { "union" } else { "struct" };
                match tag {
                    Some(tag) => write!(f, "{} {}", kind, tag),
                    None => write!(f, "{} (anonymous)", kind),
                }
            }
            TypeKind::Enum { .. } => write!(f, "enum"),
            TypeKind::Error => write!(f, "<error>"),
        }
    }
}
