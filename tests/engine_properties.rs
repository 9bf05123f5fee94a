use std::sync::Arc;
use std::time::Duration;

use suppressd::core::refresher::EngineRefresher;
use suppressd::core::snapshot::SnapshotSource;
use suppressd::{
    BatchQueryDriver, DriverConfig, EngineHandle, HashKey, HashKeyError, SuppressionEngine,
};

fn address(i: u64) -> String {
    format!("subscriber{}@example.org", i)
}

fn keys(range: std::ops::Range<u64>) -> Vec<HashKey> {
    range.map(|i| HashKey::from_email(&address(i))).collect()
}

#[test]
fn no_false_negatives_at_scale() {
    let inserted = keys(0..100_000);
    let engine = SuppressionEngine::build(inserted.clone());

    assert_eq!(engine.count(), 100_000);
    for key in &inserted {
        assert!(engine.is_suppressed(key), "false negative for {}", key);
    }
}

#[test]
fn no_false_negatives_at_tiny_rate() {
    let inserted = keys(0..5_000);
    let engine = SuppressionEngine::build_with_rate(inserted.clone(), 1e-9);
    assert!(inserted.iter().all(|k| engine.is_suppressed(k)));
}

#[test]
fn filter_false_positive_rate_is_bounded() {
    let engine = SuppressionEngine::build(keys(0..100_000));
    let lookups = keys(1_000_000..1_200_000);

    let filter_hits = lookups.iter().filter(|k| engine.may_contain(k)).count();
    let observed = filter_hits as f64 / lookups.len() as f64;
    assert!(
        observed <= 0.002,
        "filter FPR {} exceeds 2x the 0.1% target",
        observed
    );

    // exact verification removes every one of them
    assert!(lookups.iter().all(|k| !engine.is_suppressed(k)));
}

#[test]
fn build_is_idempotent_across_order_and_duplicates() {
    let base = keys(0..20_000);
    let mut shuffled: Vec<HashKey> = base.iter().rev().copied().collect();
    shuffled.extend(base.iter().step_by(3).copied());

    let first = SuppressionEngine::build(base);
    let second = SuppressionEngine::build(shuffled);

    assert_eq!(first.count(), second.count());
    assert_eq!(first.index().as_slice(), second.index().as_slice());
    assert_eq!(first.bloom().num_bits(), second.bloom().num_bits());
    assert_eq!(first.bloom().hash_rounds(), second.bloom().hash_rounds());
    for key in keys(0..40_000) {
        assert_eq!(first.may_contain(&key), second.may_contain(&key));
    }
}

#[test]
fn address_normalization() {
    assert_eq!(
        HashKey::from_email("User@Example.com"),
        HashKey::from_email(" user@example.com ")
    );
}

#[test]
fn two_address_scenario() {
    let engine = SuppressionEngine::build(vec![
        HashKey::from_email("a@x.com"),
        HashKey::from_email("b@x.com"),
    ]);
    assert!(engine.is_suppressed(&HashKey::from_email("a@x.com")));
    assert!(!engine.is_suppressed(&HashKey::from_email("c@x.com")));
}

#[test]
fn memory_scales_with_filter_plus_sixteen_bytes_per_entry() {
    let engine = SuppressionEngine::build(keys(0..100_000));
    let stats = engine.stats();

    // 1.44 * log2(1000) ≈ 14.35 bits per entry for the filter
    let filter_bits_per_entry = stats.bloom_bits as f64 / 100_000.0;
    assert!(
        (14.0..15.0).contains(&filter_bits_per_entry),
        "filter uses {} bits/entry",
        filter_bits_per_entry
    );
    assert_eq!(stats.index_bytes, 16 * 100_000);
    assert!(stats.bloom_bytes < stats.index_bytes / 8);
}

#[test]
fn hex_parsing_scenario() {
    assert!(matches!(
        HashKey::from_hex("not-a-valid-hash"),
        Err(HashKeyError::InvalidHashLength { .. })
    ));
    assert!(HashKey::from_hex("deadbeefdeadbeefdeadbeefdeadbeef").is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_match_single_threaded_reference() {
    let engine = Arc::new(SuppressionEngine::build(keys(0..50_000)));

    // one in ten candidates is suppressed
    let candidates: Vec<HashKey> = (0..1_000_000u64)
        .map(|i| {
            if i % 10 == 0 {
                HashKey::from_email(&address(i / 10 % 50_000))
            } else {
                HashKey::from_email(&address(10_000_000 + i))
            }
        })
        .collect();
    let reference: Vec<bool> = candidates.iter().map(|k| engine.is_suppressed(k)).collect();

    let driver = BatchQueryDriver::new(DriverConfig {
        workers: 8,
        batch_size: 4_096,
        queue_capacity: 4,
        latency_sample_every: 128,
        collect_outcomes: true,
    });
    let report = driver.run(engine.clone(), candidates).await.unwrap();

    assert_eq!(report.total, 1_000_000);
    assert_eq!(report.suppressed, 100_000);
    assert_eq!(report.outcomes.as_deref(), Some(reference.as_slice()));
    assert!(report.latency.samples > 0);
    assert!(report.latency.p50_ns <= report.latency.p95_ns);
    assert!(report.latency.p95_ns <= report.latency.p99_ns);
    assert!(report.checks_per_second > 0.0);
}

/// Each load returns the next generation; generation g suppresses 0..g*1000
struct GrowingSnapshot {
    generation: std::sync::atomic::AtomicU64,
}

#[async_trait::async_trait]
impl SnapshotSource for GrowingSnapshot {
    async fn load(&self) -> anyhow::Result<Vec<HashKey>> {
        let g = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        Ok(keys(0..g * 1_000))
    }

    fn describe(&self) -> String {
        "growing".to_string()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_partial_engine_during_refresh() {
    let handle = Arc::new(EngineHandle::empty());
    let refresher = EngineRefresher::new(
        Arc::new(GrowingSnapshot {
            generation: Default::default(),
        }),
        handle.clone(),
        0.001,
        Duration::from_secs(3600),
    );

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..50 {
                    let engine = handle.load();
                    let n = engine.count();
                    assert_eq!(n % 1_000, 0, "partial engine with {} entries", n);
                    assert!(keys(0..n).iter().all(|k| engine.is_suppressed(k)));
                }
            })
        })
        .collect();

    for g in 1..=5u64 {
        let outcome = refresher.refresh_once().await.unwrap();
        assert_eq!(outcome.entries, g * 1_000);
        assert_eq!(outcome.version, g + 1);
    }
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(handle.load().count(), 5_000);
}
