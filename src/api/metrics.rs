use crate::core::suppression_engine::{CheckOutcome, EngineStats};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Metrics for monitoring the suppression service.
///
/// Each instance owns its registry, so several can coexist in one process.
pub struct Metrics {
    registry: Registry,
    pub checks_total: IntCounter,
    pub suppressed_total: IntCounter,
    pub filter_false_positives_total: IntCounter,
    pub engine_entries: IntGauge,
    pub engine_memory_bytes: IntGauge,
    pub engine_version: IntGauge,
    pub rebuilds_total: IntCounter,
    pub rebuild_failures_total: IntCounter,
    pub rebuild_duration: Histogram,
    pub check_batch_latency: Histogram,
    pub memory_usage: Gauge,
}

impl Metrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks_total = IntCounter::new("suppression_checks_total", "Total membership checks")?;
        let suppressed_total = IntCounter::new(
            "suppression_suppressed_total",
            "Checks answered as suppressed",
        )?;
        let filter_false_positives_total = IntCounter::new(
            "suppression_filter_false_positives_total",
            "Bloom filter matches rejected by the exact index",
        )?;
        let engine_entries = IntGauge::new(
            "suppression_engine_entries",
            "Unique entries in the published engine",
        )?;
        let engine_memory_bytes = IntGauge::new(
            "suppression_engine_memory_bytes",
            "Memory footprint of the published engine in bytes",
        )?;
        let engine_version = IntGauge::new(
            "suppression_engine_version",
            "Version of the published engine",
        )?;
        let rebuilds_total =
            IntCounter::new("suppression_rebuilds_total", "Successful engine rebuilds")?;
        let rebuild_failures_total = IntCounter::new(
            "suppression_rebuild_failures_total",
            "Failed engine rebuilds",
        )?;
        let rebuild_duration = Histogram::with_opts(HistogramOpts::new(
            "suppression_rebuild_duration_seconds",
            "Snapshot load and engine build time in seconds",
        ))?;
        let check_batch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "suppression_check_batch_latency_seconds",
                "Latency of a batch of checks in seconds",
            )
            .buckets(prometheus::exponential_buckets(1e-6, 4.0, 12)?),
        )?;
        let memory_usage = Gauge::with_opts(Opts::new(
            "memory_usage_mb",
            "Memory usage in Million Bytes",
        ))?;

        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(suppressed_total.clone()))?;
        registry.register(Box::new(filter_false_positives_total.clone()))?;
        registry.register(Box::new(engine_entries.clone()))?;
        registry.register(Box::new(engine_memory_bytes.clone()))?;
        registry.register(Box::new(engine_version.clone()))?;
        registry.register(Box::new(rebuilds_total.clone()))?;
        registry.register(Box::new(rebuild_failures_total.clone()))?;
        registry.register(Box::new(rebuild_duration.clone()))?;
        registry.register(Box::new(check_batch_latency.clone()))?;
        registry.register(Box::new(memory_usage.clone()))?;

        Ok(Self {
            registry,
            checks_total,
            suppressed_total,
            filter_false_positives_total,
            engine_entries,
            engine_memory_bytes,
            engine_version,
            rebuilds_total,
            rebuild_failures_total,
            rebuild_duration,
            check_batch_latency,
            memory_usage,
        })
    }

    pub fn record_outcome(&self, outcome: CheckOutcome) {
        self.checks_total.inc();
        match outcome {
            CheckOutcome::Suppressed => self.suppressed_total.inc(),
            CheckOutcome::FilterFalsePositive => self.filter_false_positives_total.inc(),
            CheckOutcome::Clear => {}
        }
    }

    /// Update capacity gauges after a publish
    pub fn record_engine(&self, version: u64, stats: &EngineStats) {
        self.engine_version.set(version as i64);
        self.engine_entries.set(stats.entries as i64);
        self.engine_memory_bytes.set(stats.memory_bytes as i64);
    }

    /// Prometheus text exposition
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
