//! # suppressd
//!
//! Suppression membership engine: answers "is this address suppressed?" for
//! tens of millions of deny-listed addresses with zero false negatives.
//!
//! - `core::hash_key`: 128-bit MD5 identity of a normalized address
//! - `storage::bloom_filter`: filter tier, O(k) bit tests
//! - `storage::exact_index`: sorted key array, O(log n) binary search
//! - `core::suppression_engine`: the two tiers behind one query
//! - `core::engine_handle` / `core::refresher`: rebuild off to the side, swap atomically
//! - `core::batch_driver`: many-reader worker pool with throughput and latency stats
//!
//! ```ignore
//! use suppressd::{HashKey, SuppressionEngine};
//!
//! let engine = SuppressionEngine::build(vec![HashKey::from_email("a@x.com")]);
//! assert!(engine.is_suppressed(&HashKey::from_email("A@X.com ")));
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;

pub use crate::core::batch_driver::{BatchQueryDriver, DriverConfig, DriverReport, LatencySummary};
pub use crate::core::engine_handle::{EngineHandle, PublishedEngine};
pub use crate::core::hash_key::HashKey;
pub use crate::core::suppression_engine::{
    CheckOutcome, DEFAULT_FALSE_POSITIVE_RATE, EngineStats, SuppressionEngine,
};
pub use error::{HashKeyError, IngestError};
pub use storage::bloom_filter::{BloomFilter, BloomParams};
pub use storage::exact_index::ExactIndex;
