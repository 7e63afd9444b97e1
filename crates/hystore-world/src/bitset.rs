//! Growable bit vector backed by 64-bit words.
//!
//! Word `i` holds bits `64*i .. 64*i+63`, least significant bit first, which
//! is also the on-disk layout of the ticking-block set.

#[derive(Debug, Clone, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.to_words() == other.to_words()
    }
}

impl Eq for BitSet {}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1u64 << (bit % 64)) != 0)
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }

    pub fn clear(&mut self, bit: usize) {
        if let Some(w) = self.words.get_mut(bit / 64) {
            *w &= !(1u64 << (bit % 64));
        }
    }

    pub fn set_range(&mut self, start: usize, len: usize) {
        for bit in start..start + len {
            self.set(bit);
        }
    }

    pub fn clear_range(&mut self, start: usize, len: usize) {
        for bit in start..start + len {
            self.clear(bit);
        }
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Backing words with trailing zero words dropped.
    pub fn to_words(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |last| last + 1);
        &self.words[..len]
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..64usize).filter(move |&b| w & (1u64 << b) != 0).map(move |b| i * 64 + b)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let mut bits = BitSet::new();
        assert!(!bits.get(1000));
        bits.set(0);
        bits.set(63);
        bits.set(64);
        bits.set(1000);
        assert!(bits.get(0) && bits.get(63) && bits.get(64) && bits.get(1000));
        assert!(!bits.get(1));
        assert_eq!(bits.cardinality(), 4);
        bits.clear(1000);
        assert!(!bits.get(1000));
        assert_eq!(bits.cardinality(), 3);
    }

    #[test]
    fn words_are_trimmed() {
        let mut bits = BitSet::new();
        bits.set(5);
        bits.set(700);
        bits.clear(700);
        assert_eq!(bits.to_words(), &[1 << 5]);
        bits.clear(5);
        assert!(bits.to_words().is_empty());
        assert!(bits.is_empty());
    }

    #[test]
    fn ranges_and_iteration() {
        let mut bits = BitSet::new();
        bits.set_range(62, 4);
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![62, 63, 64, 65]);
        bits.clear_range(63, 2);
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![62, 65]);
    }
}
