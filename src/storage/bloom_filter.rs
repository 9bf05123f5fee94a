//! Bit-array Bloom filter over [`HashKey`]s
//!
//! Sizing:
//! - m = ceil(-n * ln(p) / ln(2)^2), rounded up to a multiple of 64, within
//!   [64, 2^40]
//! - k = round((m / n) * ln(2)), clamped to [1, 16]
//!
//! Bit positions use double hashing over the two 64-bit halves of the key:
//! position_i = (h1 + i * h2) mod m. Insert and lookup share `positions`, so
//! an inserted key can never be reported absent.

use crate::core::hash_key::HashKey;
use std::f64::consts::LN_2;

pub const MIN_HASH_ROUNDS: u32 = 1;
pub const MAX_HASH_ROUNDS: u32 = 16;
const MIN_BITS: u64 = 64;
/// 128 GiB of filter; a multiple of the word size
pub const MAX_BITS: u64 = 1 << 40;
const WORD_BITS: u64 = 64;

/// Substitutes for a rate outside (0, 1): p <= 0 asks for the strictest
/// filter, p >= 1 or NaN for the loosest
const STRICTEST_FALSE_POSITIVE_RATE: f64 = 1e-12;
const LOOSEST_FALSE_POSITIVE_RATE: f64 = 0.5;

/// Sizing derived from expected element count and target false positive rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    pub num_bits: u64,
    pub hash_rounds: u32,
}

impl BloomParams {
    /// Optimal (m, k) for `expected_elements` at `false_positive_rate`.
    ///
    /// Degenerate input is clamped, never rejected: n < 1 is treated as 1, a
    /// rate outside (0, 1) (or NaN) is replaced by a usable one, and m never
    /// exceeds [`MAX_BITS`]. Any rate inside (0, 1) is used as given.
    pub fn optimal(expected_elements: u64, false_positive_rate: f64) -> Self {
        let n = expected_elements.max(1) as f64;
        let p = usable_rate(false_positive_rate);

        let raw_bits = (-n * p.ln() / (LN_2 * LN_2)).ceil().min(MAX_BITS as f64);
        let num_bits = (raw_bits as u64).max(MIN_BITS).div_ceil(WORD_BITS) * WORD_BITS;

        let k = ((num_bits as f64 / n) * LN_2).round() as u32;
        let hash_rounds = k.clamp(MIN_HASH_ROUNDS, MAX_HASH_ROUNDS);

        Self {
            num_bits,
            hash_rounds,
        }
    }

    /// Theoretical false positive rate after `elements` insertions:
    /// (1 - e^(-kn/m))^k
    pub fn expected_fpr(&self, elements: u64) -> f64 {
        let exponent = -(self.hash_rounds as f64) * (elements as f64) / (self.num_bits as f64);
        (1.0 - exponent.exp()).powi(self.hash_rounds as i32)
    }
}

fn usable_rate(rate: f64) -> f64 {
    if rate <= 0.0 {
        STRICTEST_FALSE_POSITIVE_RATE
    } else if rate < 1.0 {
        rate
    } else {
        // p >= 1 or NaN
        LOOSEST_FALSE_POSITIVE_RATE
    }
}

/// Probabilistic set: no false negatives, bounded false positives.
///
/// Populated during the build phase through `&mut self`; once shared it is
/// read-only, so concurrent `may_contain` calls need no locking.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    params: BloomParams,
}

impl BloomFilter {
    /// Create an empty filter sized for `expected_elements` at `false_positive_rate`
    pub fn new(expected_elements: u64, false_positive_rate: f64) -> Self {
        Self::with_params(BloomParams::optimal(expected_elements, false_positive_rate))
    }

    pub fn with_params(params: BloomParams) -> Self {
        let words = vec![0u64; (params.num_bits / WORD_BITS) as usize];
        Self { words, params }
    }

    /// Set the k bits for `key`
    pub fn insert(&mut self, key: &HashKey) {
        let num_bits = self.params.num_bits;
        let rounds = self.params.hash_rounds;
        for bit in positions(key, num_bits, rounds) {
            self.words[(bit / WORD_BITS) as usize] |= 1u64 << (bit % WORD_BITS);
        }
    }

    /// True if every one of the k bits for `key` is set
    #[inline]
    pub fn may_contain(&self, key: &HashKey) -> bool {
        positions(key, self.params.num_bits, self.params.hash_rounds)
            .all(|bit| self.words[(bit / WORD_BITS) as usize] & (1u64 << (bit % WORD_BITS)) != 0)
    }

    pub fn num_bits(&self) -> u64 {
        self.params.num_bits
    }

    pub fn hash_rounds(&self) -> u32 {
        self.params.hash_rounds
    }

    pub fn params(&self) -> BloomParams {
        self.params
    }

    /// Footprint of the bit array in bytes
    pub fn memory_bytes(&self) -> u64 {
        self.params.num_bits / 8
    }

    /// Number of set bits (fill ratio diagnostics)
    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }
}

/// The k bit positions of `key` in an m-bit array
#[inline]
fn positions(key: &HashKey, num_bits: u64, rounds: u32) -> impl Iterator<Item = u64> {
    let (high, low) = key.halves();
    let h1 = high % num_bits;
    let h2 = low % num_bits;
    (0..rounds as u64).scan(h1, move |pos, i| {
        let current = *pos;
        if i + 1 < rounds as u64 {
            *pos = (*pos + h2) % num_bits;
        }
        Some(current)
    })
}
