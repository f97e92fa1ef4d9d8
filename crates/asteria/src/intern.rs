//! A small string interner for identifiers and object keys.
//!
//! Identifiers are looked up constantly during parsing and compilation
//! (scope lookups key on them); interning lets those lookups compare `Rc`
//! pointers before falling back to a byte comparison, and lets many
//! [`Rstr`](crate::value::Rstr) clones in a compiled program share one
//! allocation.

use ahash::AHashMap;

use crate::value::Rstr;

#[derive(Debug, Default)]
pub struct Interner {
    table: AHashMap<Rc<str>, Rstr>,
}

use std::rc::Rc;

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self { table: AHashMap::new() }
    }

    pub fn intern(&mut self, text: &str) -> Rstr {
        if let Some(existing) = self.table.get(text) {
            return existing.clone();
        }
        let rc: Rstr = Rc::from(text);
        self.table.insert(rc.clone(), rc.clone());
        rc
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_intern_shares_allocation() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
    }
}
