//! Lexically-scoped symbol stack.
//!
//! A single linear stack of (interned name, IR reference) pairs. Scope
//! entry records the stack depth; exit truncates back to it. Lookup walks
//! from the top so the innermost scope wins. The stack is reset per
//! function.

use symbol_table::GlobalSymbol as Symbol;

use crate::ir::IrRef;

#[derive(Debug, Default)]
pub struct SymbolStack {
    entries: Vec<(Symbol, IrRef)>,
}

impl SymbolStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to the IR reference of its storage in the current scope.
    pub fn define(&mut self, name: Symbol, storage: IrRef) {
        self.entries.push((name, storage));
    }

    /// Innermost-first lookup.
    pub fn lookup(&self, name: Symbol) -> Option<IrRef> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| *entry == name)
            .map(|&(_, storage)| storage)
    }

    /// Current stack depth, recorded on scope entry.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Drop every binding made since `depth` was recorded.
    pub fn truncate(&mut self, depth: usize) {
        self.entries.truncate(depth);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
