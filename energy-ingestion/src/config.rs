use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use crate::{alerts::DEFAULT_ALERT_SUBJECT, pipeline::OrchestratorSettings};

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub uri: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            uri: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 200,
            write_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub kind: NotifierKind,
    pub webhook_url: Option<String>,
    pub subject: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: None,
            subject: DEFAULT_ALERT_SUBJECT.to_string(),
            max_retries: 2,
            retry_backoff_ms: 200,
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub concurrency: usize,
    pub batch_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboxConfig {
    pub dir: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Re-runs of a batch's retryable records before the file is rejected.
    #[serde(default = "default_inbox_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_inbox_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_inbox_max_retries() -> u32 {
    5
}

fn default_inbox_retry_backoff_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub sites: Vec<String>,
    pub records_per_batch: usize,
    pub interval_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sites: [
                "SolarFarm_AZ_001",
                "WindPark_CA_002",
                "HydroStation_OR_003",
                "GeoPlant_NV_004",
                "BatteryBank_TX_005",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            records_per_batch: 10,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub inbox: Option<InboxConfig>,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ENERGY_INGEST_CONFIG").unwrap_or_else(|_| "energy-ingest.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        let cfg = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path, store = ?cfg.store.kind, alerts = ?cfg.alerts.kind, "configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.concurrency == 0 {
            anyhow::bail!("ingest.concurrency must be at least 1");
        }
        if self.store.kind == StoreKind::Postgres && self.store.uri.is_none() {
            anyhow::bail!("store.uri is required when store.kind = \"postgres\"");
        }
        if self.alerts.kind == NotifierKind::Webhook && self.alerts.webhook_url.is_none() {
            anyhow::bail!("alerts.webhook_url is required when alerts.kind = \"webhook\"");
        }
        if self.simulator.records_per_batch == 0 {
            anyhow::bail!("simulator.records_per_batch must be at least 1");
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            concurrency: self.ingest.concurrency,
            batch_timeout: Duration::from_millis(self.ingest.batch_timeout_ms),
            write_max_retries: self.writer.max_retries,
            write_retry_backoff: Duration::from_millis(self.writer.retry_backoff_ms),
            write_timeout: Duration::from_millis(self.writer.write_timeout_ms),
            alert_subject: self.alerts.subject.clone(),
            alert_max_retries: self.alerts.max_retries,
            alert_retry_backoff: Duration::from_millis(self.alerts.retry_backoff_ms),
            alert_timeout: Duration::from_millis(self.alerts.timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.store.kind, StoreKind::Memory);
        assert_eq!(cfg.alerts.kind, NotifierKind::Log);
        assert_eq!(cfg.ingest.concurrency, 8);
        assert_eq!(cfg.simulator.sites.len(), 5);
        assert!(cfg.inbox.is_none());
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn parses_full_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "postgres"
            uri = "postgres://energy@localhost/energy"
            max_connections = 10

            [writer]
            max_retries = 5
            retry_backoff_ms = 50

            [alerts]
            kind = "webhook"
            webhook_url = "http://alerts.local/hook"

            [ingest]
            concurrency = 4
            batch_timeout_ms = 1000

            [inbox]
            dir = "/var/spool/energy"

            [metrics]
            bind_addr = "0.0.0.0:9100"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.store.kind, StoreKind::Postgres);
        assert_eq!(cfg.store.max_connections, 10);
        assert_eq!(cfg.writer.write_timeout_ms, 5_000);
        assert_eq!(cfg.alerts.subject, "Energy Anomaly Alert");
        let inbox = cfg.inbox.as_ref().unwrap();
        assert_eq!(inbox.poll_interval_ms, 5_000);
        assert_eq!(inbox.max_retries, 5);
        assert_eq!(inbox.retry_backoff_ms, 30_000);

        let settings = cfg.orchestrator_settings();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.write_max_retries, 5);
        assert_eq!(settings.write_retry_backoff, Duration::from_millis(50));
        assert_eq!(settings.batch_timeout, Duration::from_secs(1));
    }

    #[test]
    fn rejects_inconsistent_settings() {
        assert!(AppConfig::from_toml_str("[ingest]\nconcurrency = 0").is_err());
        assert!(AppConfig::from_toml_str("[store]\nkind = \"postgres\"").is_err());
        assert!(AppConfig::from_toml_str("[alerts]\nkind = \"webhook\"").is_err());
        assert!(AppConfig::from_toml_str("[store]\nkind = \"dynamo\"").is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = AppConfig::from_toml_str(include_str!("../../config/energy-ingest.example.toml"))
            .unwrap();
        assert_eq!(cfg.alerts.kind, NotifierKind::Webhook);
        assert_eq!(cfg.simulator.records_per_batch, 10);
    }
}
