use crate::core::hash_key::HashKey;
use crate::storage::{bloom_filter::BloomFilter, exact_index::ExactIndex};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, trace};

/// Target false positive rate of the filter tier in production
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;

/// Result of a single membership query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Filter rejected the key (fast path)
    Clear,
    /// Filter matched but the exact index did not
    FilterFalsePositive,
    Suppressed,
}

impl CheckOutcome {
    pub fn is_suppressed(self) -> bool {
        self == CheckOutcome::Suppressed
    }
}

/// Two-tier suppression membership engine
/// Tier 1: Bloom filter (O(k) bit tests, may false-positive, never false-negative)
/// Tier 2: Exact index (O(log n) binary search, authoritative)
///
/// Built once from a full snapshot and immutable afterwards. Refreshing means
/// building a new engine and publishing it through
/// [`EngineHandle`](crate::core::engine_handle::EngineHandle).
#[derive(Debug)]
pub struct SuppressionEngine {
    bloom: BloomFilter,
    index: ExactIndex,
    false_positive_rate: f64,
    built_at: DateTime<Utc>,
}

impl SuppressionEngine {
    /// Build at the default 0.1% filter false positive rate
    pub fn build<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = HashKey>,
    {
        Self::build_with_rate(keys, DEFAULT_FALSE_POSITIVE_RATE)
    }

    /// Deduplicate and sort into the exact index, then size and populate the
    /// filter from that same deduplicated set
    pub fn build_with_rate<I>(keys: I, false_positive_rate: f64) -> Self
    where
        I: IntoIterator<Item = HashKey>,
    {
        let start = Instant::now();
        let index = ExactIndex::from_unsorted(keys.into_iter().collect());

        let mut bloom = BloomFilter::new(index.len() as u64, false_positive_rate);
        for key in index.iter() {
            bloom.insert(key);
        }

        let engine = Self {
            bloom,
            index,
            false_positive_rate,
            built_at: Utc::now(),
        };
        info!(
            "Suppression engine built: {} entries, {} bits, k={}, {} bytes in {:?}",
            engine.count(),
            engine.bloom.num_bits(),
            engine.bloom.hash_rounds(),
            engine.memory_bytes(),
            start.elapsed()
        );
        engine
    }

    /// Full two-tier query with the tier that answered
    #[inline]
    pub fn check(&self, key: &HashKey) -> CheckOutcome {
        if !self.bloom.may_contain(key) {
            return CheckOutcome::Clear;
        }
        if self.index.contains(key) {
            CheckOutcome::Suppressed
        } else {
            trace!("Filter false positive for {}", key);
            CheckOutcome::FilterFalsePositive
        }
    }

    #[inline]
    pub fn is_suppressed(&self, key: &HashKey) -> bool {
        self.check(key).is_suppressed()
    }

    /// Query by a raw address or a 32-hex digest
    pub fn is_value_suppressed(&self, value: &str) -> bool {
        self.is_suppressed(&HashKey::from_address_or_hash(value))
    }

    /// Filter tier alone; exposed for false positive measurement
    pub fn may_contain(&self, key: &HashKey) -> bool {
        self.bloom.may_contain(key)
    }

    /// Number of unique entries
    pub fn count(&self) -> u64 {
        self.index.len() as u64
    }

    /// Filter bits plus 16 bytes per indexed key
    pub fn memory_bytes(&self) -> u64 {
        self.bloom.memory_bytes() + self.index.memory_bytes()
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }

    pub fn index(&self) -> &ExactIndex {
        &self.index
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn stats(&self) -> EngineStats {
        let entries = self.count();
        let bloom_bytes = self.bloom.memory_bytes();
        let index_bytes = self.index.memory_bytes();
        let memory_bytes = bloom_bytes + index_bytes;
        EngineStats {
            entries,
            bloom_bits: self.bloom.num_bits(),
            hash_rounds: self.bloom.hash_rounds(),
            bloom_bytes,
            index_bytes,
            memory_bytes,
            bytes_per_entry: if entries == 0 {
                0.0
            } else {
                memory_bytes as f64 / entries as f64
            },
            false_positive_rate: self.false_positive_rate,
            expected_false_positive_rate: self.bloom.params().expected_fpr(entries),
            built_at: self.built_at,
        }
    }
}

/// Capacity figures for dashboards and logs
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub entries: u64,
    pub bloom_bits: u64,
    pub hash_rounds: u32,
    pub bloom_bytes: u64,
    pub index_bytes: u64,
    pub memory_bytes: u64,
    pub bytes_per_entry: f64,
    pub false_positive_rate: f64,
    pub expected_false_positive_rate: f64,
    pub built_at: DateTime<Utc>,
}
