use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use rand::{Rng, RngCore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use suppressd::api::{metrics::Metrics, rest_api};
use suppressd::config::AppConfig;
use suppressd::core::{
    batch_driver::BatchQueryDriver,
    engine_handle::EngineHandle,
    hash_key::HashKey,
    refresher::EngineRefresher,
    snapshot::{FileSnapshot, SnapshotSource},
    suppression_engine::SuppressionEngine,
};
use suppressd::storage::ingest::{self, IngestFormat};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "suppressd")]
#[command(about = "Email suppression membership engine", version)]
struct Cli {
    /// Path to configuration TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the suppression export to load
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the engine, keep it fresh and serve checks over HTTP
    Serve,
    /// Measure throughput and latency with the batch query driver
    Bench {
        /// Candidate list (same formats as the suppression export)
        #[arg(long)]
        candidates: Option<PathBuf>,
        /// Number of synthetic candidates when no list is given
        #[arg(long, default_value_t = 1_000_000)]
        synthetic: usize,
        /// Share of synthetic candidates drawn from the suppressed set
        #[arg(long, default_value_t = 0.01)]
        hit_ratio: f64,
    },
    /// Check addresses or md5 digests once
    Check {
        #[arg(required = true)]
        values: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // CLI
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::default(),
    };
    if let Some(input) = &cli.input {
        cfg.ingest.path = input.clone();
    }

    // Initialize tracing - RUST_LOG wins, else config log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("suppressd={}", cfg.monitoring.log_level).into()),
        )
        .init();

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Bench {
            candidates,
            synthetic,
            hit_ratio,
        } => bench(cfg, candidates, synthetic, hit_ratio).await,
        Command::Check { values } => check(cfg, values).await,
    }
}

/// Load the configured export and build an engine from it
async fn build_engine(cfg: &AppConfig) -> Result<SuppressionEngine> {
    let source = FileSnapshot::new(cfg.ingest.path.clone(), cfg.ingest.format);
    let keys = source.load().await.context("Failed to load suppression export")?;
    let rate = cfg.engine.false_positive_rate;
    tokio::task::spawn_blocking(move || SuppressionEngine::build_with_rate(keys, rate))
        .await
        .context("Engine build task panicked")
}

async fn serve(cfg: AppConfig) -> Result<()> {
    info!("Starting suppressd...");

    // Initialize metrics
    let metrics = Arc::new(Metrics::new().context("Failed to initialize metrics")?);

    // Initial build is fatal on failure; refreshes are not
    let engine = build_engine(&cfg).await?;
    let handle = Arc::new(EngineHandle::new(engine));
    metrics.record_engine(handle.version(), &handle.load().stats());
    info!("Suppression engine v{} published", handle.version());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresher_handle = if cfg.refresh.enabled {
        let source: Arc<dyn SnapshotSource> =
            Arc::new(FileSnapshot::new(cfg.ingest.path.clone(), cfg.ingest.format));
        let refresher = EngineRefresher::new(
            source,
            handle.clone(),
            cfg.engine.false_positive_rate,
            Duration::from_secs(cfg.refresh.interval_secs),
        )
        .with_metrics(metrics.clone());
        Some(tokio::spawn(refresher.run(shutdown_rx)))
    } else {
        info!("Periodic refresh disabled");
        None
    };

    let server_handle = if cfg.server.enabled {
        let app = rest_api::create_router(handle.clone(), metrics.clone());
        let addr = format!("0.0.0.0:{}", cfg.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("REST API: http://{}", addr);
        info!("Metrics: http://{}/metrics", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server error: {}", e);
            }
        }))
    } else {
        warn!("HTTP server disabled; engine is only reachable in-process");
        None
    };

    // Periodically update memory usage gauge
    {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            use sysinfo::{ProcessesToUpdate, System};
            let mut sys = System::new();
            loop {
                sys.refresh_processes(ProcessesToUpdate::All, true);
                if let Ok(pid) = sysinfo::get_current_pid() {
                    if let Some(process) = sys.process(pid) {
                        // memory() returns bytes
                        metrics
                            .memory_usage
                            .set(process.memory() as f64 / 1_000_000.0);
                    }
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    info!("suppressd started successfully");

    // Wait for shutdown signal
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, gracefully shutting down...");

    let _ = shutdown_tx.send(true);
    if let Some(task) = refresher_handle {
        let _ = task.await;
    }
    if let Some(task) = server_handle {
        task.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn bench(
    cfg: AppConfig,
    candidates: Option<PathBuf>,
    synthetic: usize,
    hit_ratio: f64,
) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&hit_ratio),
        "--hit-ratio must be within [0, 1], got {}",
        hit_ratio
    );
    let engine = Arc::new(build_engine(&cfg).await?);

    let candidates = match candidates {
        Some(path) => {
            let report = tokio::task::spawn_blocking(move || {
                ingest::load_file(&path, IngestFormat::Auto)
            })
            .await
            .context("Candidate ingestion task panicked")?
            .context("Failed to load candidate list")?;
            report.keys
        }
        None => synthetic_candidates(&engine, synthetic, hit_ratio),
    };
    info!("Running batch driver over {} candidates", candidates.len());

    let driver = BatchQueryDriver::new(cfg.driver.driver_config(false));
    let report = driver.run(engine.clone(), candidates).await?;

    let output = serde_json::json!({
        "engine": engine.stats(),
        "driver": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Random candidates; roughly `hit_ratio` of them are drawn from the suppressed set
fn synthetic_candidates(engine: &SuppressionEngine, count: usize, hit_ratio: f64) -> Vec<HashKey> {
    let suppressed = engine.index().as_slice();
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            if !suppressed.is_empty() && rng.random_bool(hit_ratio) {
                suppressed[rng.random_range(0..suppressed.len())]
            } else {
                let mut bytes = [0u8; 16];
                rng.fill_bytes(&mut bytes);
                HashKey::from_bytes(bytes)
            }
        })
        .collect()
}

async fn check(cfg: AppConfig, values: Vec<String>) -> Result<()> {
    let engine = build_engine(&cfg).await?;
    for value in values {
        println!("{}\t{}", value, engine.is_value_suppressed(&value));
    }
    Ok(())
}
