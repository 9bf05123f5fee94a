use crate::api::metrics::Metrics;
use crate::core::engine_handle::EngineHandle;
use crate::core::snapshot::SnapshotSource;
use crate::core::suppression_engine::SuppressionEngine;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

/// Summary of a successful rebuild
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub version: u64,
    pub entries: u64,
    pub memory_bytes: u64,
    pub elapsed: Duration,
}

/// Periodically rebuilds the engine from a fresh snapshot and publishes it.
///
/// The new engine is built off to the side on a blocking thread; readers keep
/// using the previous one until the swap. A failed rebuild leaves the
/// previous engine in place.
pub struct EngineRefresher {
    source: Arc<dyn SnapshotSource>,
    handle: Arc<EngineHandle>,
    false_positive_rate: f64,
    interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl EngineRefresher {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        handle: Arc<EngineHandle>,
        false_positive_rate: f64,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            handle,
            false_positive_rate,
            interval,
            metrics: None,
        }
    }

    /// Attach metrics collection
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Load, build and publish once
    pub async fn refresh_once(&self) -> Result<RefreshOutcome> {
        let start = Instant::now();
        let result = self.rebuild().await;
        let elapsed = start.elapsed();

        match result {
            Ok(engine) => {
                let stats = engine.stats();
                let (version, _previous) = self.handle.publish(engine);
                if let Some(m) = &self.metrics {
                    m.rebuilds_total.inc();
                    m.rebuild_duration.observe(elapsed.as_secs_f64());
                    m.record_engine(version, &stats);
                }
                Ok(RefreshOutcome {
                    version,
                    entries: stats.entries,
                    memory_bytes: stats.memory_bytes,
                    elapsed,
                })
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.rebuild_failures_total.inc();
                }
                Err(e)
            }
        }
    }

    async fn rebuild(&self) -> Result<SuppressionEngine> {
        let keys = self
            .source
            .load()
            .await
            .with_context(|| format!("Failed to load snapshot from {}", self.source.describe()))?;
        let rate = self.false_positive_rate;
        tokio::task::spawn_blocking(move || SuppressionEngine::build_with_rate(keys, rate))
            .await
            .context("Engine build task panicked")
    }

    /// Refresh every `interval` until `shutdown` becomes true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // the first tick fires immediately; the caller already built once
        ticker.tick().await;
        info!(
            "Refreshing from {} every {:?}",
            self.source.describe(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.refresh_once().await {
                        Ok(outcome) => info!(
                            "Refreshed suppression engine v{}: {} entries, {} bytes in {:?}",
                            outcome.version, outcome.entries, outcome.memory_bytes, outcome.elapsed
                        ),
                        Err(e) => error!("Suppression refresh failed, keeping current engine: {:#}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Refresher stopping");
                        break;
                    }
                }
            }
        }
    }
}
