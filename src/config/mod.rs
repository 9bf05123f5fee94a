use crate::core::batch_driver::DriverConfig;
use crate::core::suppression_engine::DEFAULT_FALSE_POSITIVE_RATE;
use crate::storage::ingest::IngestFormat;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub false_positive_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub path: PathBuf,
    pub format: IngestFormat,
    pub org_id: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/suppressions.csv"),
            format: IngestFormat::Auto,
            org_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub latency_sample_every: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            batch_size: 10_000,
            queue_capacity: 64,
            latency_sample_every: 64,
        }
    }
}

impl DriverSettings {
    pub fn driver_config(&self, collect_outcomes: bool) -> DriverConfig {
        DriverConfig {
            workers: self.workers,
            batch_size: self.batch_size,
            queue_capacity: self.queue_capacity,
            latency_sample_every: self.latency_sample_every,
            collect_outcomes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub ingest: IngestConfig,
    pub refresh: RefreshConfig,
    pub driver: DriverSettings,
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
}

impl AppConfig {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config file at {}",
                path.as_ref().to_string_lossy()
            )
        })?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(data).context("Failed to parse TOML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.engine.false_positive_rate;
        ensure!(
            rate > 0.0 && rate < 1.0,
            "engine.false_positive_rate must be in (0, 1), got {}",
            rate
        );
        ensure!(self.driver.workers >= 1, "driver.workers must be >= 1");
        ensure!(self.driver.batch_size >= 1, "driver.batch_size must be >= 1");
        ensure!(
            self.driver.queue_capacity >= 1,
            "driver.queue_capacity must be >= 1"
        );
        ensure!(
            self.driver.latency_sample_every >= 1,
            "driver.latency_sample_every must be >= 1"
        );
        ensure!(
            self.refresh.interval_secs >= 1,
            "refresh.interval_secs must be >= 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.engine.false_positive_rate, 0.001);
        assert_eq!(cfg.ingest.format, IngestFormat::Auto);
        assert_eq!(cfg.refresh.interval_secs, 300);
        assert_eq!(cfg.driver.workers, 8);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.monitoring.log_level, "info");
    }

    #[test]
    fn test_full_config() {
        let cfg = AppConfig::from_toml(
            r#"
            [engine]
            false_positive_rate = 0.0001

            [ingest]
            path = "/var/lib/suppressd/export.txt"
            format = "plain"
            org_id = "acme"

            [refresh]
            enabled = false
            interval_secs = 60

            [driver]
            workers = 2
            batch_size = 500

            [server]
            port = 9000

            [monitoring]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.engine.false_positive_rate, 0.0001);
        assert_eq!(cfg.ingest.path, PathBuf::from("/var/lib/suppressd/export.txt"));
        assert_eq!(cfg.ingest.format, IngestFormat::Plain);
        assert_eq!(cfg.ingest.org_id, "acme");
        assert!(!cfg.refresh.enabled);
        assert_eq!(cfg.driver.workers, 2);
        assert_eq!(cfg.driver.batch_size, 500);
        assert_eq!(cfg.driver.queue_capacity, 64);
        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.server.enabled);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let err = AppConfig::from_toml("[engine]\nfalse_positive_rate = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("false_positive_rate"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(AppConfig::from_toml("[driver]\nworkers = 0\n").is_err());
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(AppConfig::from_toml("[ingest]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load_from_path("/nonexistent/suppressd.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
