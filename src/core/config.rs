use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/sessioncore.toml";

/// Top-level configuration for the session core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this broker node; scopes queue producers and consumer groups.
    pub service_id: String,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub will: WillConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "QueueConfig::default_partitions")]
    pub partitions: u32,
    #[serde(default = "QueueConfig::default_cluster_event_topic")]
    pub cluster_event_topic: String,
    #[serde(default = "QueueConfig::default_publish_msg_topic")]
    pub publish_msg_topic: String,
    #[serde(default = "QueueConfig::default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "QueueConfig::default_max_poll_records")]
    pub max_poll_records: usize,
}

impl QueueConfig {
    const fn default_partitions() -> u32 {
        4
    }

    fn default_cluster_event_topic() -> String {
        "cluster.events".into()
    }

    fn default_publish_msg_topic() -> String {
        "publish.msg".into()
    }

    const fn default_poll_timeout_ms() -> u64 {
        100
    }

    const fn default_max_poll_records() -> usize {
        64
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partitions: Self::default_partitions(),
            cluster_event_topic: Self::default_cluster_event_topic(),
            publish_msg_topic: Self::default_publish_msg_topic(),
            poll_timeout_ms: Self::default_poll_timeout_ms(),
            max_poll_records: Self::default_max_poll_records(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WillConfig {
    /// Name attached to the last-will scheduler worker in logs.
    #[serde(default = "WillConfig::default_scheduler_name")]
    pub scheduler_name: String,
}

impl WillConfig {
    fn default_scheduler_name() -> String {
        "last-will-scheduler".into()
    }
}

impl Default for WillConfig {
    fn default() -> Self {
        Self {
            scheduler_name: Self::default_scheduler_name(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: Option<String>,
}

impl Config {
    /// Minimal single-node configuration with defaults for everything but the service id.
    pub fn for_service(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            queue: QueueConfig::default(),
            will: WillConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load configuration from a path resolved via SESSIONCORE_CONFIG or defaults to
    /// `config/sessioncore.toml`, then apply environment overrides.
    pub fn load_from_env() -> Result<Self> {
        Self::load_with_overrides(env_config_path())
    }

    /// Load `path`, then apply environment overrides.
    pub fn load_with_overrides(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::load(path)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    /// Validate schema-level invariants before startup.
    pub fn validate(&self) -> Result<()> {
        if self.service_id.trim().is_empty() {
            bail!("service_id must be non-empty");
        }
        if self.queue.partitions == 0 {
            bail!("queue.partitions must be > 0");
        }
        if self.queue.max_poll_records == 0 {
            bail!("queue.max_poll_records must be > 0");
        }
        if self.queue.cluster_event_topic.is_empty() || self.queue.publish_msg_topic.is_empty() {
            bail!("queue topics must be non-empty");
        }
        if self.queue.cluster_event_topic == self.queue.publish_msg_topic {
            bail!("queue.cluster_event_topic must differ from queue.publish_msg_topic");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(service_id) = std::env::var("SESSIONCORE_SERVICE_ID") {
            self.service_id = service_id;
        }
    }
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SESSIONCORE_CONFIG") {
        PathBuf::from(path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json"))
}
