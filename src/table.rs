//! Interning table for ground atoms.
//!
//! Every atom that appears in a graph's valuations gets a dense [`AtomId`].
//! Ids are handed out in the order atoms are first interned, and the
//! grounding engine interns in a fixed order (static facts, then dynamic
//! facts, both in file order), so grounding the same graph twice always
//! yields the same ids.

use std::collections::HashMap;

use crate::bitset::BitSet;
use crate::graph::RawAtom;
use crate::types::AtomId;

#[derive(Debug, Clone, Default)]
pub struct AtomTable {
    /// Reverse lookup: id -> atom.
    atoms: Vec<RawAtom>,
    index: HashMap<RawAtom, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interned atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Returns the id of `atom`, interning it if it is new.
    pub fn intern(&mut self, atom: &RawAtom) -> AtomId {
        if let Some(&id) = self.index.get(atom) {
            return id;
        }
        let id = AtomId::new(self.atoms.len());
        self.atoms.push(atom.clone());
        self.index.insert(atom.clone(), id);
        id
    }

    /// Looks an atom up without interning it.
    pub fn get(&self, atom: &RawAtom) -> Option<AtomId> {
        self.index.get(atom).copied()
    }

    /// Returns the atom with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this table.
    pub fn atom(&self, id: AtomId) -> &RawAtom {
        &self.atoms[id.index()]
    }

    /// Iterates over `(id, atom)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (AtomId, &RawAtom)> {
        self.atoms.iter().enumerate().map(|(i, a)| (AtomId::new(i), a))
    }

    /// The set of atoms whose predicate satisfies `keep`.
    pub fn select(&self, keep: impl Fn(&str) -> bool) -> BitSet {
        self.iter().filter(|(_, a)| keep(&a.predicate)).map(|(id, _)| id).collect()
    }

    /// Renders a set of atoms for diagnostics, e.g. `{at(a), clear(b)}`.
    pub fn describe(&self, set: &BitSet) -> String {
        let atoms: Vec<String> = set.iter().map(|id| self.atom(id).to_string()).collect();
        format!("{{{}}}", atoms.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = AtomTable::new();
        let a = table.intern(&RawAtom::new("p", ["a"]));
        let b = table.intern(&RawAtom::new("p", ["b"]));
        let a2 = table.intern(&RawAtom::new("p", ["a"]));
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn test_get_and_reverse_lookup() {
        let mut table = AtomTable::new();
        let id = table.intern(&RawAtom::new("on", ["a", "b"]));
        assert_eq!(table.get(&RawAtom::new("on", ["a", "b"])), Some(id));
        assert_eq!(table.get(&RawAtom::new("on", ["b", "a"])), None);
        assert_eq!(table.atom(id).to_string(), "on(a,b)");
    }

    #[test]
    fn test_select_and_describe() {
        let mut table = AtomTable::new();
        table.intern(&RawAtom::new("p", ["a"]));
        table.intern(&RawAtom::new("q", ["a"]));
        table.intern(&RawAtom::new("p", ["b"]));
        let ps = table.select(|p| p == "p");
        assert_eq!(ps.len(), 2);
        assert_eq!(table.describe(&ps), "{p(a), p(b)}");
    }
}
