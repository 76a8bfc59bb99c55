//! # Component Bitsets
//!
//! Compact growable bit vectors indexed by [`ComponentTypeId`].
//!
//! Every entity carries two of these: one for membership (has the component)
//! and one for the enabled state (component present and active). Query masks
//! are compiled into the same representation so matching is a handful of
//! word operations.
//!
//! ## Performance
//!
//! - Insert/remove/contains: O(1)
//! - Subset/disjoint tests: O(words)
//! - Iterate set bits: O(set bits), skipping clean words
//!
//! [`ComponentTypeId`]: super::ComponentTypeId

/// Growable bit vector, 64 bits per word.
#[derive(Clone, Debug, Default)]
pub struct Bitset {
    /// 1 = set, 0 = clear.
    words: Vec<u64>,
}

impl Bitset {
    /// Creates an empty bitset.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Creates an empty bitset able to hold `bits` bits without growing.
    #[must_use]
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0u64; bits.div_ceil(64)],
        }
    }

    #[inline]
    const fn split(index: usize) -> (usize, u64) {
        (index / 64, 1u64 << (index % 64))
    }

    /// Sets a bit. Returns `true` if it was previously clear.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let (word, mask) = Self::split(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_clear = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_clear
    }

    /// Clears a bit. Returns `true` if it was previously set.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        let (word, mask) = Self::split(index);
        match self.words.get_mut(word) {
            Some(bits) if *bits & mask != 0 => {
                *bits &= !mask;
                true
            }
            _ => false,
        }
    }

    /// Sets or clears a bit. Returns `true` if the bit changed.
    #[inline]
    pub fn assign(&mut self, index: usize, value: bool) -> bool {
        if value {
            self.insert(index)
        } else {
            self.remove(index)
        }
    }

    /// Checks whether a bit is set.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        let (word, mask) = Self::split(index);
        self.words.get(word).is_some_and(|bits| bits & mask != 0)
    }

    /// Checks whether no bit is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears every bit without releasing memory.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Returns `true` if every bit set in `self` is also set in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.words.iter().enumerate().all(|(i, &bits)| {
            let theirs = other.words.get(i).copied().unwrap_or(0);
            bits & !theirs == 0
        })
    }

    /// Returns `true` if `self` and `other` share no set bit.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    /// Iterates over the indices of set bits in ascending order.
    ///
    /// Uses `trailing_zeros` to skip clean regions.
    #[must_use]
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over set bit indices of a [`Bitset`].
pub struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    current_word: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit = self.current_word.trailing_zeros() as usize;
                // Clear lowest set bit
                self.current_word &= self.current_word - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            self.current_word = *self.words.get(self.word_idx)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let mut bits = Bitset::new();
        assert!(!bits.contains(5));
        assert!(bits.insert(5));
        assert!(!bits.insert(5), "second insert reports no change");
        assert!(bits.contains(5));

        assert!(bits.insert(130), "grows past the first word");
        assert!(bits.contains(130));
        assert_eq!(bits.count(), 2);

        assert!(bits.remove(5));
        assert!(!bits.remove(5));
        assert!(!bits.remove(10_000), "removing beyond the end is a no-op");
        assert_eq!(bits.count(), 1);
    }

    #[test]
    fn test_subset_and_disjoint_across_lengths() {
        let mut small = Bitset::new();
        small.insert(1);

        let mut large = Bitset::with_capacity(256);
        large.insert(1);
        large.insert(200);

        assert!(small.is_subset_of(&large));
        assert!(!large.is_subset_of(&small));
        assert!(Bitset::new().is_subset_of(&small));

        let mut other = Bitset::new();
        other.insert(200);
        assert!(small.is_disjoint(&other));
        assert!(!large.is_disjoint(&other));
    }

    #[test]
    fn test_ones_iterates_in_order() {
        let mut bits = Bitset::new();
        for i in [0, 3, 63, 64, 65, 191] {
            bits.insert(i);
        }
        let collected: Vec<usize> = bits.ones().collect();
        assert_eq!(collected, vec![0, 3, 63, 64, 65, 191]);

        bits.clear();
        assert!(bits.is_empty());
        assert_eq!(bits.ones().count(), 0);
    }
}
