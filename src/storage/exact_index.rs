use crate::core::hash_key::HashKey;

/// Sorted, deduplicated set of hash keys.
///
/// Ground truth for membership; the Bloom filter in front of it only exists
/// to skip the binary search for keys that are clearly absent.
#[derive(Debug, Clone, Default)]
pub struct ExactIndex {
    keys: Vec<HashKey>,
}

impl ExactIndex {
    /// Sort and collapse duplicates
    pub fn from_unsorted(mut keys: Vec<HashKey>) -> Self {
        keys.sort_unstable();
        keys.dedup();
        keys.shrink_to_fit();
        Self { keys }
    }

    /// O(log n) binary search
    #[inline]
    pub fn contains(&self, key: &HashKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 16 bytes per entry
    pub fn memory_bytes(&self) -> u64 {
        (self.keys.len() * std::mem::size_of::<HashKey>()) as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashKey> {
        self.keys.iter()
    }

    pub fn as_slice(&self) -> &[HashKey] {
        &self.keys
    }
}
