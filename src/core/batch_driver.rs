//! Concurrent batch query driver
//!
//! Splits a candidate list into fixed-size batches, feeds them through a
//! bounded queue to a fixed pool of workers and aggregates throughput,
//! outcome counts and sampled latency percentiles. Every worker shares the
//! same immutable engine without locking.

use crate::api::metrics::Metrics;
use crate::core::hash_key::HashKey;
use crate::core::suppression_engine::{CheckOutcome, SuppressionEngine};
use anyhow::{Context, Result, bail};
use flume::{Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub queue_capacity: usize,
    /// Time one query out of every N
    pub latency_sample_every: usize,
    /// Keep the per-candidate answers in the report
    pub collect_outcomes: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            batch_size: 10_000,
            queue_capacity: 64,
            latency_sample_every: 64,
            collect_outcomes: false,
        }
    }
}

/// Slice of the candidate list handed to one worker
struct Batch {
    offset: usize,
    keys: Arc<[HashKey]>,
    len: usize,
}

/// Per-worker accumulation, merged after the run
#[derive(Default)]
struct WorkerTally {
    checked: u64,
    suppressed: u64,
    filter_false_positives: u64,
    batches: u64,
    latencies_ns: Vec<u64>,
    outcomes: Vec<(usize, Vec<bool>)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
}

impl LatencySummary {
    /// Nearest-rank percentiles over unsorted samples
    pub fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        Self {
            samples: samples.len(),
            p50_ns: percentile(&samples, 50.0),
            p95_ns: percentile(&samples, 95.0),
            p99_ns: percentile(&samples, 99.0),
            max_ns: samples[samples.len() - 1],
        }
    }
}

fn percentile(sorted: &[u64], pct: f64) -> u64 {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub total: u64,
    pub suppressed: u64,
    pub clear: u64,
    pub filter_false_positives: u64,
    pub batches: u64,
    pub workers: usize,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,
    pub checks_per_second: f64,
    pub latency: LatencySummary,
    #[serde(skip)]
    pub outcomes: Option<Vec<bool>>,
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1_000.0)
}

pub struct BatchQueryDriver {
    config: DriverConfig,
    metrics: Option<Arc<Metrics>>,
}

impl BatchQueryDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Attach metrics collection
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check every candidate against `engine` using the worker pool
    pub async fn run(
        &self,
        engine: Arc<SuppressionEngine>,
        candidates: Vec<HashKey>,
    ) -> Result<DriverReport> {
        let DriverConfig {
            workers,
            batch_size,
            queue_capacity,
            latency_sample_every,
            collect_outcomes,
        } = self.config.clone();
        if workers == 0 || batch_size == 0 || queue_capacity == 0 || latency_sample_every == 0 {
            bail!("Driver workers, batch size, queue capacity and sample rate must be >= 1");
        }

        let total = candidates.len();
        let candidates: Arc<[HashKey]> = candidates.into();
        let (tx, rx) = flume::bounded::<Batch>(queue_capacity);
        let start = Instant::now();

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let rx = rx.clone();
                let engine = engine.clone();
                let metrics = self.metrics.clone();
                tokio::task::spawn_blocking(move || {
                    drain_batches(
                        worker_id,
                        rx,
                        &engine,
                        latency_sample_every,
                        collect_outcomes,
                        metrics.as_deref(),
                    )
                })
            })
            .collect();
        drop(rx);

        produce_batches(tx, candidates, batch_size).await?;

        let mut merged = WorkerTally::default();
        for tally in futures::future::join_all(handles).await {
            let tally = tally.context("Query worker panicked")?;
            merged.checked += tally.checked;
            merged.suppressed += tally.suppressed;
            merged.filter_false_positives += tally.filter_false_positives;
            merged.batches += tally.batches;
            merged.latencies_ns.extend(tally.latencies_ns);
            merged.outcomes.extend(tally.outcomes);
        }
        let elapsed = start.elapsed();

        let outcomes = collect_outcomes.then(|| {
            let mut answers = vec![false; total];
            for (offset, batch) in merged.outcomes {
                answers[offset..offset + batch.len()].copy_from_slice(&batch);
            }
            answers
        });

        let secs = elapsed.as_secs_f64();
        let report = DriverReport {
            total: merged.checked,
            suppressed: merged.suppressed,
            clear: merged.checked - merged.suppressed - merged.filter_false_positives,
            filter_false_positives: merged.filter_false_positives,
            batches: merged.batches,
            workers,
            elapsed,
            checks_per_second: if secs > 0.0 {
                merged.checked as f64 / secs
            } else {
                0.0
            },
            latency: LatencySummary::from_samples(merged.latencies_ns),
            outcomes,
        };
        info!(
            "Checked {} candidates with {} workers in {:?}: {} suppressed, {} filter false positives, {:.0} checks/s",
            report.total,
            workers,
            elapsed,
            report.suppressed,
            report.filter_false_positives,
            report.checks_per_second
        );
        Ok(report)
    }
}

/// Push batches into the bounded queue; awaits while it is full
async fn produce_batches(tx: Sender<Batch>, keys: Arc<[HashKey]>, batch_size: usize) -> Result<()> {
    let mut offset = 0;
    while offset < keys.len() {
        let len = batch_size.min(keys.len() - offset);
        tx.send_async(Batch {
            offset,
            keys: keys.clone(),
            len,
        })
        .await
        .context("All query workers exited early")?;
        offset += len;
    }
    Ok(())
}

fn drain_batches(
    worker_id: usize,
    rx: Receiver<Batch>,
    engine: &SuppressionEngine,
    latency_sample_every: usize,
    collect_outcomes: bool,
    metrics: Option<&Metrics>,
) -> WorkerTally {
    let mut tally = WorkerTally::default();

    while let Ok(batch) = rx.recv() {
        let batch_start = Instant::now();
        let keys = &batch.keys[batch.offset..batch.offset + batch.len];
        let mut answers = Vec::with_capacity(if collect_outcomes { keys.len() } else { 0 });
        let (mut suppressed, mut false_positives) = (0u64, 0u64);

        for (i, key) in keys.iter().enumerate() {
            let outcome = if i % latency_sample_every == 0 {
                let t = Instant::now();
                let outcome = engine.check(key);
                tally.latencies_ns.push(t.elapsed().as_nanos() as u64);
                outcome
            } else {
                engine.check(key)
            };
            match outcome {
                CheckOutcome::Suppressed => suppressed += 1,
                CheckOutcome::FilterFalsePositive => false_positives += 1,
                CheckOutcome::Clear => {}
            }
            if collect_outcomes {
                answers.push(outcome.is_suppressed());
            }
        }

        tally.checked += keys.len() as u64;
        tally.suppressed += suppressed;
        tally.filter_false_positives += false_positives;
        tally.batches += 1;
        if collect_outcomes {
            tally.outcomes.push((batch.offset, answers));
        }
        if let Some(m) = metrics {
            m.checks_total.inc_by(keys.len() as u64);
            m.suppressed_total.inc_by(suppressed);
            m.filter_false_positives_total.inc_by(false_positives);
            m.check_batch_latency
                .observe(batch_start.elapsed().as_secs_f64());
        }
    }

    debug!(
        "Worker {} finished: {} batches, {} checks",
        worker_id, tally.batches, tally.checked
    );
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(range: std::ops::Range<u64>) -> Vec<HashKey> {
        range
            .map(|i| HashKey::from_email(&format!("user{}@example.com", i)))
            .collect()
    }

    fn config(workers: usize, batch_size: usize) -> DriverConfig {
        DriverConfig {
            workers,
            batch_size,
            queue_capacity: 2,
            latency_sample_every: 1,
            collect_outcomes: true,
        }
    }

    #[tokio::test]
    async fn test_producer_waits_while_queue_is_full() {
        let (tx, rx) = flume::bounded::<Batch>(2);
        let producer = tokio::spawn(produce_batches(tx, keys(0..100).into(), 10));

        // nobody is draining: the producer fills the queue and then parks
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(rx.len(), 2);
        assert!(!producer.is_finished());

        let mut received = 0;
        while let Ok(batch) = rx.recv_async().await {
            assert!(rx.len() <= 2);
            assert_eq!(batch.offset, received);
            received += batch.len;
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        assert_eq!(received, 100);
        producer.await.unwrap().unwrap();
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let summary = LatencySummary::from_samples((1..=100).rev().collect());
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.p50_ns, 50);
        assert_eq!(summary.p95_ns, 95);
        assert_eq!(summary.p99_ns, 99);
        assert_eq!(summary.max_ns, 100);

        let single = LatencySummary::from_samples(vec![7]);
        assert_eq!((single.p50_ns, single.p99_ns), (7, 7));

        let empty = LatencySummary::from_samples(Vec::new());
        assert_eq!(empty.samples, 0);
        assert_eq!(empty.p99_ns, 0);
    }

    #[tokio::test]
    async fn test_counts_and_outcome_order() {
        let engine = Arc::new(SuppressionEngine::build(keys(0..1_000)));
        // even indices suppressed, odd indices not
        let candidates: Vec<HashKey> = (0..2_000u64)
            .map(|i| {
                if i % 2 == 0 {
                    HashKey::from_email(&format!("user{}@example.com", i / 2))
                } else {
                    HashKey::from_email(&format!("other{}@example.com", i))
                }
            })
            .collect();

        let report = BatchQueryDriver::new(config(4, 37))
            .run(engine, candidates)
            .await
            .unwrap();

        assert_eq!(report.total, 2_000);
        assert_eq!(report.suppressed, 1_000);
        assert_eq!(report.clear + report.filter_false_positives, 1_000);
        assert_eq!(report.batches, 2_000u64.div_ceil(37));
        assert_eq!(report.latency.samples, 2_000);
        let outcomes = report.outcomes.unwrap();
        assert!(outcomes.iter().enumerate().all(|(i, hit)| *hit == (i % 2 == 0)));
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let engine = Arc::new(SuppressionEngine::build(keys(0..10)));
        let report = BatchQueryDriver::new(config(3, 10))
            .run(engine, Vec::new())
            .await
            .unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.batches, 0);
        assert_eq!(report.outcomes, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_rejects_zero_workers() {
        let engine = Arc::new(SuppressionEngine::build(Vec::new()));
        let result = BatchQueryDriver::new(config(0, 10))
            .run(engine, keys(0..10))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_records_metrics() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let engine = Arc::new(SuppressionEngine::build(keys(0..100)));
        BatchQueryDriver::new(DriverConfig::default())
            .with_metrics(metrics.clone())
            .run(engine, keys(50..150))
            .await
            .unwrap();

        assert_eq!(metrics.checks_total.get(), 100);
        assert_eq!(metrics.suppressed_total.get(), 50);
    }

    #[test]
    fn test_report_serializes() {
        let report = DriverReport {
            total: 1,
            suppressed: 0,
            clear: 1,
            filter_false_positives: 0,
            batches: 1,
            workers: 1,
            elapsed: Duration::from_millis(2),
            checks_per_second: 500.0,
            latency: LatencySummary::default(),
            outcomes: Some(vec![false]),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!((json["elapsed"].as_f64().unwrap() - 2.0).abs() < 1e-9);
        assert!(json.get("outcomes").is_none());
    }
}
