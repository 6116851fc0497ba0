//! Per-segment doc-id Bloom filter used to probe deletion propagation
//! (spec.md §4.4): a positive is resolved by a full scan of that segment's
//! doc-id inventory; a negative short-circuits the scan entirely.

use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u8,
}

impl BloomFilter {
    /// Size a filter for `expected_elements` doc ids at `false_positive_rate`.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        let n = expected_elements.max(1) as f64;
        let p = false_positive_rate.max(0.0001).min(0.5);
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / ln2_sq).ceil() as usize;
        let num_bits = num_bits.max(64);

        let num_words = num_bits.div_ceil(64);
        let num_bits = num_words * 64;

        let num_hashes = ((num_bits as f64 / n) * std::f64::consts::LN_2).round() as u8;
        let num_hashes = num_hashes.clamp(1, 16);

        Self {
            bits: vec![0u64; num_words],
            num_bits,
            num_hashes,
        }
    }

    /// Reconstruct a filter from its on-disk bit words, e.g. when loading a
    /// segment's header back into memory.
    pub fn from_raw(bits: Vec<u64>, num_hashes: u8) -> Self {
        let num_bits = bits.len() * 64;
        Self {
            bits,
            num_bits,
            num_hashes,
        }
    }

    #[inline]
    pub fn insert(&mut self, doc_id: u32) {
        let (h1, h2) = self.hash_pair(doc_id);
        for i in 0..self.num_hashes as u64 {
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;
            self.bits[bit_index / 64] |= 1u64 << (bit_index % 64);
        }
    }

    /// `false` means definitely absent; `true` means "go scan the segment's
    /// doc-id inventory to be sure" (spec.md §4.4, §9).
    #[inline]
    pub fn might_contain(&self, doc_id: u32) -> bool {
        let (h1, h2) = self.hash_pair(doc_id);
        for i in 0..self.num_hashes as u64 {
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;
            if self.bits[bit_index / 64] & (1u64 << (bit_index % 64)) == 0 {
                return false;
            }
        }
        true
    }

    #[inline]
    fn hash_pair(&self, doc_id: u32) -> (u64, u64) {
        let mut hasher1 = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
        hasher1.write_u32(doc_id);
        let h1 = hasher1.finish();

        let mut hasher2 = RandomState::with_seeds(
            0x517cc1b727220a95,
            0x9e3779b97f4a7c15,
            0xbf58476d1ce4e5b9,
            0x94d049bb133111eb,
        )
        .build_hasher();
        hasher2.write_u32(doc_id);
        let h2 = hasher2.finish();

        (h1, h2)
    }

    pub fn bits(&self) -> &[u64] {
        &self.bits
    }

    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_items_are_found() {
        let mut bf = BloomFilter::new(1000, 0.01);
        for i in 0..100u32 {
            bf.insert(i);
        }
        for i in 0..100u32 {
            assert!(bf.might_contain(i));
        }
    }

    #[test]
    fn false_positive_rate_is_in_range() {
        let expected_fpr = 0.01;
        let num_elements = 10_000u32;
        let mut bf = BloomFilter::new(num_elements as usize, expected_fpr);
        for i in 0..num_elements {
            bf.insert(i);
        }

        let mut false_positives = 0;
        let sample = 100_000u32;
        for i in (num_elements * 2)..(num_elements * 2 + sample) {
            if bf.might_contain(i) {
                false_positives += 1;
            }
        }
        let actual_fpr = false_positives as f64 / sample as f64;
        assert!(actual_fpr <= expected_fpr * 3.0, "fpr too high: {actual_fpr}");
    }

    #[test]
    fn from_raw_roundtrips_bits() {
        let mut bf = BloomFilter::new(1000, 0.01);
        bf.insert(42);
        let reloaded = BloomFilter::from_raw(bf.bits().to_vec(), bf.num_hashes());
        assert!(reloaded.might_contain(42));
    }
}
