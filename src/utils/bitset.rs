use std::fmt::Debug;

// -------------------------------------------------------------------------------------------------

/// Fixed size bit set with `WORDS * 64` bits, used to track pool slot occupancy.
///
/// All operations are allocation free. Out of range indices panic in debug builds and are
/// ignored (or read as unset) in release builds.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BitSet<const WORDS: usize> {
    words: [u64; WORDS],
}

impl<const WORDS: usize> BitSet<WORDS> {
    /// Number of bits in the set.
    pub const CAPACITY: usize = WORDS * 64;

    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        debug_assert!(index < Self::CAPACITY, "Bit index out of range");
        match self.words.get(index / 64) {
            Some(word) => word & (1u64 << (index % 64)) != 0,
            None => false,
        }
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < Self::CAPACITY, "Bit index out of range");
        if let Some(word) = self.words.get_mut(index / 64) {
            *word |= 1u64 << (index % 64);
        }
    }

    #[inline]
    pub fn reset(&mut self, index: usize) {
        debug_assert!(index < Self::CAPACITY, "Bit index out of range");
        if let Some(word) = self.words.get_mut(index / 64) {
            *word &= !(1u64 << (index % 64));
        }
    }

    /// Unset all bits.
    pub fn clear(&mut self) {
        self.words = [0; WORDS];
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|word| *word != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.words.iter().all(|word| *word == u64::MAX)
    }

    /// Index of the lowest unset bit, if any.
    pub fn first_unset(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(index, word)| index * 64 + word.trailing_ones() as usize)
    }

    /// Iterate over the indices of all set bits in ascending order.
    pub fn iter(&self) -> BitSetIter<WORDS> {
        BitSetIter {
            words: self.words,
            word_index: 0,
        }
    }
}

impl<const WORDS: usize> Default for BitSet<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> Debug for BitSet<WORDS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitSet")
            .field("capacity", &Self::CAPACITY)
            .field("count", &self.count())
            .finish()
    }
}

impl<const WORDS: usize> IntoIterator for BitSet<WORDS> {
    type Item = usize;
    type IntoIter = BitSetIter<WORDS>;

    fn into_iter(self) -> Self::IntoIter {
        BitSetIter {
            words: self.words,
            word_index: 0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Iterator over the set bits of a copied [`BitSet`]. Changes to the source set while
/// iterating are not visible to the iterator.
#[derive(Debug, Clone)]
pub struct BitSetIter<const WORDS: usize> {
    words: [u64; WORDS],
    word_index: usize,
}

impl<const WORDS: usize> Iterator for BitSetIter<WORDS> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        while self.word_index < WORDS {
            let word = &mut self.words[self.word_index];
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= *word - 1;
                return Some(self.word_index * 64 + bit);
            }
            self.word_index += 1;
        }
        None
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_reset() {
        let mut bits = BitSet::<2>::new();
        assert_eq!(BitSet::<2>::CAPACITY, 128);
        assert!(!bits.any());
        bits.set(0);
        bits.set(63);
        bits.set(64);
        bits.set(127);
        assert!(bits.test(0) && bits.test(63) && bits.test(64) && bits.test(127));
        assert!(!bits.test(1));
        assert_eq!(bits.count(), 4);
        bits.reset(63);
        assert!(!bits.test(63));
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![0, 64, 127]);
        bits.clear();
        assert!(!bits.any());
    }

    #[test]
    fn first_unset() {
        let mut bits = BitSet::<2>::new();
        assert_eq!(bits.first_unset(), Some(0));
        for index in 0..70 {
            bits.set(index);
        }
        assert_eq!(bits.first_unset(), Some(70));
        bits.reset(5);
        assert_eq!(bits.first_unset(), Some(5));
        for index in 0..BitSet::<2>::CAPACITY {
            bits.set(index);
        }
        assert!(bits.is_full());
        assert_eq!(bits.first_unset(), None);
    }

    #[test]
    fn iter_is_a_copy() {
        let mut bits = BitSet::<1>::new();
        bits.set(3);
        bits.set(7);
        let mut visited = Vec::new();
        for index in bits {
            bits.reset(index);
            visited.push(index);
        }
        assert_eq!(visited, vec![3, 7]);
        assert!(!bits.any());
    }
}
