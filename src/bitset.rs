//! Compact atom sets for node valuations.
//!
//! A node's valuation is the set of ground atoms true at that node. Atom ids
//! are dense, so a bit set backed by `u64` words is both the smallest and the
//! fastest representation: projection onto the model's predicates is a
//! word-wise AND, and the canonical key used to look nodes up by valuation is
//! the word vector itself.

use std::hash::{Hash, Hasher};

use crate::types::AtomId;

/// A set of atom ids backed by a vector of u64 words.
///
/// Equality and hashing ignore trailing zero words, so two sets holding the
/// same atoms compare equal regardless of how much capacity they reserved.
#[derive(Debug, Clone, Default)]
pub struct BitSet {
    /// Storage: each u64 holds 64 bits
    words: Vec<u64>,
}

impl BitSet {
    /// Number of bits per word.
    const BITS_PER_WORD: usize = 64;

    /// Creates a new empty bit set with the given capacity (in bits).
    pub fn new(capacity: usize) -> Self {
        let num_words = capacity.div_ceil(Self::BITS_PER_WORD);
        Self {
            words: vec![0; num_words],
        }
    }

    /// Creates an empty bit set with no pre-allocated capacity.
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    /// Builds a set from atom ids.
    pub fn from_atoms(atoms: impl IntoIterator<Item = AtomId>) -> Self {
        let mut set = Self::empty();
        for atom in atoms {
            set.insert(atom);
        }
        set
    }

    /// Gets the word index and bit position for a given bit index.
    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        (index / Self::BITS_PER_WORD, index % Self::BITS_PER_WORD)
    }

    /// Returns the number of set bits.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if no bits are set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns true if the atom is in the set.
    #[inline]
    pub fn contains(&self, atom: AtomId) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(atom.index());
        match self.words.get(word_idx) {
            Some(word) => word & (1u64 << bit_idx) != 0,
            None => false,
        }
    }

    /// Adds the atom. Returns true if it was not previously present.
    #[inline]
    pub fn insert(&mut self, atom: AtomId) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(atom.index());

        // Grow if necessary
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }

        let mask = 1u64 << bit_idx;
        let was_clear = self.words[word_idx] & mask == 0;
        self.words[word_idx] |= mask;
        was_clear
    }

    /// Removes the atom. Returns true if it was previously present.
    #[inline]
    pub fn remove(&mut self, atom: AtomId) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(atom.index());
        let Some(word) = self.words.get_mut(word_idx) else {
            return false;
        };
        let mask = 1u64 << bit_idx;
        let was_set = *word & mask != 0;
        *word &= !mask;
        was_set
    }

    /// Returns the atoms present in both sets.
    pub fn intersection(&self, other: &BitSet) -> BitSet {
        let words = self.words.iter().zip(other.words.iter()).map(|(a, b)| a & b).collect();
        BitSet { words }
    }

    /// Returns true if every atom of `self` is also in `other`.
    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words.iter().enumerate().all(|(i, &w)| {
            let o = other.words.get(i).copied().unwrap_or(0);
            w & !o == 0
        })
    }

    /// Returns an iterator over the atoms in increasing id order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            bitset: self,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }

    /// The words without trailing zeros; this is the canonical key.
    fn significant_words(&self) -> &[u64] {
        let end = self.words.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        &self.words[..end]
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant_words() == other.significant_words()
    }
}

impl Eq for BitSet {}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl Extend<AtomId> for BitSet {
    fn extend<T: IntoIterator<Item = AtomId>>(&mut self, iter: T) {
        for atom in iter {
            self.insert(atom);
        }
    }
}

impl FromIterator<AtomId> for BitSet {
    fn from_iter<T: IntoIterator<Item = AtomId>>(iter: T) -> Self {
        Self::from_atoms(iter)
    }
}

/// Iterator over set bits in a BitSet.
pub struct BitSetIter<'a> {
    bitset: &'a BitSet,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = AtomId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit_idx = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1; // Clear lowest set bit
                return Some(AtomId::new(self.word_idx * BitSet::BITS_PER_WORD + bit_idx));
            }

            self.word_idx += 1;
            if self.word_idx >= self.bitset.words.len() {
                return None;
            }
            self.current_word = self.bitset.words[self.word_idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(i: usize) -> AtomId {
        AtomId::new(i)
    }

    #[test]
    fn test_empty() {
        let bs = BitSet::empty();
        assert!(bs.is_empty());
        assert_eq!(bs.len(), 0);
        assert!(!bs.contains(a(0)));
        assert!(!bs.contains(a(100)));
    }

    #[test]
    fn test_insert_contains() {
        let mut bs = BitSet::new(100);
        assert!(!bs.contains(a(42)));
        assert!(bs.insert(a(42)));
        assert!(bs.contains(a(42)));
        assert!(!bs.insert(a(42))); // Already set
        assert_eq!(bs.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut bs = BitSet::new(100);
        bs.insert(a(42));
        assert!(bs.remove(a(42)));
        assert!(!bs.contains(a(42)));
        assert!(!bs.remove(a(42))); // Already cleared
        assert!(!bs.remove(a(4000)));
        assert!(bs.is_empty());
    }

    #[test]
    fn test_iter() {
        let bs = BitSet::from_atoms([a(5), a(10), a(3), a(64), a(65)]);
        let indices: Vec<_> = bs.iter().map(AtomId::index).collect();
        assert_eq!(indices, vec![3, 5, 10, 64, 65]);
    }

    #[test]
    fn test_eq_ignores_capacity() {
        let mut small = BitSet::empty();
        small.insert(a(1));
        let mut large = BitSet::new(1000);
        large.insert(a(1));
        large.insert(a(700));
        large.remove(a(700));
        assert_eq!(small, large);

        use std::collections::hash_map::DefaultHasher;
        let hash = |s: &BitSet| {
            let mut h = DefaultHasher::new();
            s.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&small), hash(&large));
    }

    #[test]
    fn test_intersection_and_subset() {
        let x = BitSet::from_atoms([a(1), a(2), a(70)]);
        let mask = BitSet::from_atoms([a(2), a(70), a(71)]);
        let projected = x.intersection(&mask);
        assert_eq!(projected, BitSet::from_atoms([a(2), a(70)]));
        assert!(projected.is_subset(&x));
        assert!(projected.is_subset(&mask));
        assert!(!x.is_subset(&mask));
    }
}
