//! Value/type interner.
//!
//! The pool canonicalizes IR types and constant values to dense references:
//! structurally identical keys share one `PoolRef`. One pool is shared by
//! all functions of a translation unit.

use hashbrown::HashMap;
use serde::Serialize;
use std::num::NonZeroU32;

/// Dense reference to an interned key.
pub type PoolRef = NonZeroU32;

/// An interned IR type or constant value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PoolKey {
    // --- Types ---
    Void,
    I1,
    Ptr,
    Func,
    Int {
        width: u16,
    },
    Float {
        width: u16,
    },
    Array {
        child: PoolRef,
        len: u64,
    },
    Vector {
        child: PoolRef,
        len: u32,
    },

    // --- Constant values ---
    IntValue(i64),
    /// Stored as raw bits so the key stays hashable.
    FloatValue {
        bits: u64,
    },
    Bytes(Box<[u8]>),
}

impl PoolKey {
    pub fn float_value(value: f64) -> Self {
        PoolKey::FloatValue {
            bits: value.to_bits(),
        }
    }

    /// Bit width of an integer-like type key.
    pub fn bit_width(&self) -> Option<u16> {
        match self {
            PoolKey::I1 => Some(1),
            PoolKey::Int { width } => Some(*width),
            _ => None,
        }
    }
}

/// The interner.
pub struct Pool {
    keys: Vec<PoolKey>,
    map: HashMap<PoolKey, PoolRef>,

    // Pre-interned types every function needs.
    pub type_void: PoolRef,
    pub type_i1: PoolRef,
    pub type_ptr: PoolRef,
    pub type_func: PoolRef,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        let mut pool = Pool {
            keys: Vec::new(),
            map: HashMap::new(),
            type_void: PoolRef::new(1).unwrap(),
            type_i1: PoolRef::new(1).unwrap(),
            type_ptr: PoolRef::new(1).unwrap(),
            type_func: PoolRef::new(1).unwrap(),
        };
        pool.type_void = pool.intern(PoolKey::Void);
        pool.type_i1 = pool.intern(PoolKey::I1);
        pool.type_ptr = pool.intern(PoolKey::Ptr);
        pool.type_func = pool.intern(PoolKey::Func);
        pool
    }

    /// Intern a key, returning the canonical reference.
    pub fn intern(&mut self, key: PoolKey) -> PoolRef {
        if let Some(&r) = self.map.get(&key) {
            return r;
        }
        self.keys.push(key.clone());
        let r = PoolRef::new(self.keys.len() as u32).expect("PoolRef overflow");
        self.map.insert(key, r);
        r
    }

    #[inline]
    pub fn get(&self, r: PoolRef) -> &PoolKey {
        &self.keys[(r.get() - 1) as usize]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
