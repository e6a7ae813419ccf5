//! Type registry.
//!
//! Arena + canonicalization layer for semantic types, and the single source
//! of truth for target-dependent layout: bit sizes, byte sizes, alignment,
//! and signedness all derive from the registry's target triple.
//!
//! Invariants:
//! - All TypeRef come from this registry
//! - Types are never removed
//! - Derived types (pointer, array, vector, function) are canonicalized

use hashbrown::HashMap;
use std::num::NonZeroU32;
use target_lexicon::{Architecture, PointerWidth, Triple};

use super::types::{ArraySizeType, Type, TypeKind, TypeRef};

/// Function signature key for canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FnSigKey {
    return_type: TypeRef,
    parameters: Vec<TypeRef>,
    is_variadic: bool,
}

/// Central arena & factory for semantic types.
pub struct TypeRegistry {
    pub target_triple: Triple,

    types: Vec<Type>,

    // --- Canonicalization caches ---
    pointer_cache: HashMap<TypeRef, TypeRef>,
    array_cache: HashMap<(TypeRef, ArraySizeType), TypeRef>,
    vector_cache: HashMap<(TypeRef, u32), TypeRef>,
    function_cache: HashMap<FnSigKey, TypeRef>,
    complex_cache: HashMap<TypeRef, TypeRef>,
    enum_cache: HashMap<TypeRef, TypeRef>,

    // --- Common builtin types ---
    pub type_void: TypeRef,
    pub type_bool: TypeRef,
    pub type_char: TypeRef,
    pub type_char_unsigned: TypeRef,
    pub type_short: TypeRef,
    pub type_short_unsigned: TypeRef,
    pub type_int: TypeRef,
    pub type_int_unsigned: TypeRef,
    pub type_long: TypeRef,
    pub type_long_unsigned: TypeRef,
    pub type_long_long: TypeRef,
    pub type_long_long_unsigned: TypeRef,
    pub type_float: TypeRef,
    pub type_double: TypeRef,
    pub type_long_double: TypeRef,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(Triple::host())
    }
}

impl TypeRegistry {
    /// Create a new registry with builtin types initialized.
    pub fn new(target_triple: Triple) -> Self {
        let mut reg = TypeRegistry {
            target_triple,
            types: Vec::new(),
            pointer_cache: HashMap::new(),
            array_cache: HashMap::new(),
            vector_cache: HashMap::new(),
            function_cache: HashMap::new(),
            complex_cache: HashMap::new(),
            enum_cache: HashMap::new(),
            type_void: TypeRef::new(1).unwrap(),
            type_bool: TypeRef::new(1).unwrap(),
            type_char: TypeRef::new(1).unwrap(),
            type_char_unsigned: TypeRef::new(1).unwrap(),
            type_short: TypeRef::new(1).unwrap(),
            type_short_unsigned: TypeRef::new(1).unwrap(),
            type_int: TypeRef::new(1).unwrap(),
            type_int_unsigned: TypeRef::new(1).unwrap(),
            type_long: TypeRef::new(1).unwrap(),
            type_long_unsigned: TypeRef::new(1).unwrap(),
            type_long_long: TypeRef::new(1).unwrap(),
            type_long_long_unsigned: TypeRef::new(1).unwrap(),
            type_float: TypeRef::new(1).unwrap(),
            type_double: TypeRef::new(1).unwrap(),
            type_long_double: TypeRef::new(1).unwrap(),
        };
        reg.create_builtins();
        reg
    }

    fn create_builtins(&mut self) {
        self.type_void = self.alloc(Type::new(TypeKind::Void));
        self.type_bool = self.alloc(Type::new(TypeKind::Bool));
        self.type_char = self.alloc(Type::new(TypeKind::Char { is_signed: true }));
        self.type_char_unsigned = self.alloc(Type::new(TypeKind::Char { is_signed: false }));
        self.type_short = self.alloc(Type::new(TypeKind::Short { is_signed: true }));
        self.type_short_unsigned = self.alloc(Type::new(TypeKind::Short { is_signed: false }));
        self.type_int = self.alloc(Type::new(TypeKind::Int { is_signed: true }));
        self.type_int_unsigned = self.alloc(Type::new(TypeKind::Int { is_signed: false }));
        self.type_long = self.alloc(Type::new(TypeKind::Long {
            is_signed: true,
            is_long_long: false,
        }));
        self.type_long_unsigned = self.alloc(Type::new(TypeKind::Long {
            is_signed: false,
            is_long_long: false,
        }));
        self.type_long_long = self.alloc(Type::new(TypeKind::Long {
            is_signed: true,
            is_long_long: true,
        }));
        self.type_long_long_unsigned = self.alloc(Type::new(TypeKind::Long {
            is_signed: false,
            is_long_long: true,
        }));
        self.type_float = self.alloc(Type::new(TypeKind::Float));
        self.type_double = self.alloc(Type::new(TypeKind::Double {
            is_long_double: false,
        }));
        self.type_long_double = self.alloc(Type::new(TypeKind::Double {
            is_long_double: true,
        }));
    }

    fn alloc(&mut self, ty: Type) -> TypeRef {
        self.types.push(ty);
        NonZeroU32::new(self.types.len() as u32).expect("TypeRef overflow")
    }

    /// Resolve a TypeRef to its Type.
    #[inline]
    pub fn get(&self, r: TypeRef) -> &Type {
        &self.types[(r.get() - 1) as usize]
    }

    /// Canonical pointer to `pointee`.
    pub fn pointer_to(&mut self, pointee: TypeRef) -> TypeRef {
        if let Some(&cached) = self.pointer_cache.get(&pointee) {
            return cached;
        }
        let r = self.alloc(Type::new(TypeKind::Pointer { pointee }));
        self.pointer_cache.insert(pointee, r);
        r
    }

    /// Canonical fixed-size array of `element_type`.
    pub fn array_of(&mut self, element_type: TypeRef, len: usize) -> TypeRef {
        let size = ArraySizeType::Constant(len);
        if let Some(&cached) = self.array_cache.get(&(element_type, size)) {
            return cached;
        }
        let r = self.alloc(Type::new(TypeKind::Array { element_type, size }));
        self.array_cache.insert((element_type, size), r);
        r
    }

    /// Canonical vector of `len` elements of `element_type`.
    pub fn vector_of(&mut self, element_type: TypeRef, len: u32) -> TypeRef {
        if let Some(&cached) = self.vector_cache.get(&(element_type, len)) {
            return cached;
        }
        let r = self.alloc(Type::new(TypeKind::Vector { element_type, len }));
        self.vector_cache.insert((element_type, len), r);
        r
    }

    /// Canonical function type.
    pub fn function_of(
        &mut self,
        return_type: TypeRef,
        parameters: Vec<TypeRef>,
        is_variadic: bool,
    ) -> TypeRef {
        let key = FnSigKey {
            return_type,
            parameters: parameters.clone(),
            is_variadic,
        };
        if let Some(&cached) = self.function_cache.get(&key) {
            return cached;
        }
        let r = self.alloc(Type::new(TypeKind::Function {
            return_type,
            parameters,
            is_variadic,
        }));
        self.function_cache.insert(key, r);
        r
    }

    /// Canonical `_Complex` over `base_type`.
    pub fn complex_of(&mut self, base_type: TypeRef) -> TypeRef {
        if let Some(&cached) = self.complex_cache.get(&base_type) {
            return cached;
        }
        let r = self.alloc(Type::new(TypeKind::Complex { base_type }));
        self.complex_cache.insert(base_type, r);
        r
    }

    /// Canonical enum with the given underlying integer type.
    pub fn enum_of(&mut self, base_type: TypeRef) -> TypeRef {
        if let Some(&cached) = self.enum_cache.get(&base_type) {
            return cached;
        }
        let r = self.alloc(Type::new(TypeKind::Enum { base_type }));
        self.enum_cache.insert(base_type, r);
        r
    }

    fn pointer_bits(&self) -> u16 {
        self.target_triple
            .pointer_width()
            .map(PointerWidth::bits)
            .unwrap_or(64) as u16
    }

    fn long_double_bits(&self) -> u16 {
        match self.target_triple.architecture {
            Architecture::X86_64 => 80,
            _ => 64,
        }
    }

    /// Bit size of a scalar type on the compilation target.
    ///
    /// Aggregates report 0; callers working with aggregates want
    /// [`size_of`](Self::size_of) instead.
    pub fn bit_size(&self, r: TypeRef) -> u16 {
        match &self.get(r).kind {
            TypeKind::Void => 0,
            TypeKind::Bool => 1,
            TypeKind::Char { .. } => 8,
            TypeKind::Short { .. } => 16,
            TypeKind::Int { .. } => 32,
            TypeKind::Long { is_long_long, .. } => {
                if *is_long_long {
                    64
                } else {
                    self.pointer_bits()
                }
            }
            TypeKind::Float => 32,
            TypeKind::Double { is_long_double } => {
                if *is_long_double {
                    self.long_double_bits()
                } else {
                    64
                }
            }
            TypeKind::Pointer { .. } => self.pointer_bits(),
            TypeKind::Enum { base_type } => self.bit_size(*base_type),
            _ => 0,
        }
    }

    /// Byte size of a type on the compilation target.
    pub fn size_of(&self, r: TypeRef) -> u64 {
        match &self.get(r).kind {
            TypeKind::Void => 0,
            TypeKind::Bool => 1,
            TypeKind::Char { .. } => 1,
            TypeKind::Short { .. } => 2,
            TypeKind::Int { .. } => 4,
            TypeKind::Long { is_long_long, .. } => {
                if *is_long_long {
                    8
                } else {
                    self.pointer_bits() as u64 / 8
                }
            }
            TypeKind::Float => 4,
            TypeKind::Double { is_long_double } => {
                if *is_long_double && self.long_double_bits() == 80 {
                    16
                } else {
                    8
                }
            }
            TypeKind::Pointer { .. } | TypeKind::Function { .. } => self.pointer_bits() as u64 / 8,
            TypeKind::Array {
                element_type,
                size: ArraySizeType::Constant(len),
            } => self.size_of(*element_type) * *len as u64,
            TypeKind::Array { .. } => 0,
            TypeKind::Vector { element_type, len } => self.size_of(*element_type) * *len as u64,
            TypeKind::Enum { base_type } => self.size_of(*base_type),
            TypeKind::Complex { base_type } => self.size_of(*base_type) * 2,
            TypeKind::Record { .. } | TypeKind::Error => 0,
        }
    }

    /// Alignment of a type on the compilation target.
    pub fn align_of(&self, r: TypeRef) -> u32 {
        match &self.get(r).kind {
            TypeKind::Array { element_type, .. } => self.align_of(*element_type),
            TypeKind::Vector { .. } => {
                (self.size_of(r).next_power_of_two() as u32).clamp(1, 16)
            }
            TypeKind::Complex { base_type } => self.align_of(*base_type),
            _ => (self.size_of(r) as u32).max(1),
        }
    }

    /// Whether an arithmetic type is signed.
    pub fn is_signed(&self, r: TypeRef) -> bool {
        match &self.get(r).kind {
            TypeKind::Char { is_signed }
            | TypeKind::Short { is_signed }
            | TypeKind::Int { is_signed }
            | TypeKind::Long { is_signed, .. } => *is_signed,
            TypeKind::Float | TypeKind::Double { .. } => true,
            TypeKind::Enum { base_type } => self.is_signed(*base_type),
            _ => false,
        }
    }

    pub fn is_pointer(&self, r: TypeRef) -> bool {
        matches!(self.get(r).kind, TypeKind::Pointer { .. })
    }

    pub fn is_function(&self, r: TypeRef) -> bool {
        matches!(self.get(r).kind, TypeKind::Function { .. })
    }

    /// Pointee of a pointer type.
    pub fn pointee(&self, r: TypeRef) -> Option<TypeRef> {
        match &self.get(r).kind {
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    /// Element type of an array or vector.
    pub fn element_type(&self, r: TypeRef) -> Option<TypeRef> {
        match &self.get(r).kind {
            TypeKind::Array { element_type, .. } | TypeKind::Vector { element_type, .. } => {
                Some(*element_type)
            }
            _ => None,
        }
    }

    /// Declared element count of a fixed-size array.
    pub fn array_len(&self, r: TypeRef) -> Option<usize> {
        match &self.get(r).kind {
            TypeKind::Array {
                size: ArraySizeType::Constant(len),
                ..
            } => Some(*len),
            _ => None,
        }
    }

    /// Return type of a function type.
    pub fn return_type(&self, r: TypeRef) -> Option<TypeRef> {
        match &self.get(r).kind {
            TypeKind::Function { return_type, .. } => Some(*return_type),
            _ => None,
        }
    }
}
