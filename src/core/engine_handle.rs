use crate::core::hash_key::HashKey;
use crate::core::suppression_engine::SuppressionEngine;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// An engine together with the version it was published under
#[derive(Debug)]
pub struct PublishedEngine {
    pub version: u64,
    pub engine: Arc<SuppressionEngine>,
}

/// Shared, atomically replaceable reference to the published engine.
///
/// The version lives inside the swapped value, so a single load always
/// yields a matching (version, engine) pair. Readers keep querying their
/// snapshot even if a refresh publishes a newer engine meanwhile; the old
/// engine is dropped once the last reader releases it. Only fully built
/// engines can be published.
pub struct EngineHandle {
    current: ArcSwap<PublishedEngine>,
}

impl EngineHandle {
    /// Start at version 1 with an already built engine
    pub fn new(engine: SuppressionEngine) -> Self {
        Self {
            current: ArcSwap::from_pointee(PublishedEngine {
                version: 1,
                engine: Arc::new(engine),
            }),
        }
    }

    /// Start with an always-negative engine
    pub fn empty() -> Self {
        Self::new(SuppressionEngine::build(Vec::new()))
    }

    /// Snapshot of the currently published engine and its version
    #[inline]
    pub fn load_published(&self) -> Arc<PublishedEngine> {
        self.current.load_full()
    }

    /// Snapshot of the currently published engine
    #[inline]
    pub fn load(&self) -> Arc<SuppressionEngine> {
        self.current.load().engine.clone()
    }

    #[inline]
    pub fn is_suppressed(&self, key: &HashKey) -> bool {
        self.current.load().engine.is_suppressed(key)
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Swap in a new engine; returns the new version and the retired engine.
    /// Concurrent publishers each get a distinct version.
    pub fn publish(&self, engine: SuppressionEngine) -> (u64, Arc<SuppressionEngine>) {
        let engine = Arc::new(engine);
        let previous = self.current.rcu(|current| PublishedEngine {
            version: current.version + 1,
            engine: engine.clone(),
        });
        let version = previous.version + 1;
        info!(
            "Published suppression engine v{} ({} entries, previous had {})",
            version,
            engine.count(),
            previous.engine.count()
        );
        (version, previous.engine.clone())
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::empty()
    }
}
