//! Pipeline configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Durations are expressed in milliseconds.
//!
//! ```rust
//! use tagwall::{FinalizationPolicy, PipelineConfig};
//! use std::time::Duration;
//!
//! let config = PipelineConfig::from_yaml_str(
//!     "exclusion_ms: 60000\npolicy:\n  kind: quiet_period\n  quiet_ms: 1200\n",
//! )
//! .unwrap();
//!
//! assert_eq!(config.exclusion(), Duration::from_secs(60));
//! assert_eq!(config.policy, FinalizationPolicy::QuietPeriod { quiet_ms: 1200 });
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::protocol::ReaderSetup;
use crate::{IngestError, Result};

/// When a live session is considered closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalizationPolicy {
    /// Each session closes once its own last reading is older than `idle_ms`
    IdleTimeout { idle_ms: u64 },
    /// All sessions close together once no reading of any tag arrived for `quiet_ms`
    QuietPeriod { quiet_ms: u64 },
}

impl FinalizationPolicy {
    /// Threshold the policy compares elapsed time against
    pub fn threshold(&self) -> Duration {
        match *self {
            FinalizationPolicy::IdleTimeout { idle_ms } => Duration::from_millis(idle_ms),
            FinalizationPolicy::QuietPeriod { quiet_ms } => Duration::from_millis(quiet_ms),
        }
    }
}

impl Default for FinalizationPolicy {
    fn default() -> Self {
        FinalizationPolicy::IdleTimeout { idle_ms: 800 }
    }
}

/// Serial link settings used by the `serial` feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Substring a device path must contain to be treated as a reader
    pub port_pattern: String,
    pub setup: ReaderSetup,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self { baud_rate: 115_200, port_pattern: "ttyUSB".to_string(), setup: ReaderSetup::default() }
    }
}

/// Tunables for the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the reading hand-off queue
    pub queue_capacity: usize,
    /// Upper bound a link read may wait for bytes
    pub read_timeout_ms: u64,
    /// Size of the per-port read buffer
    pub read_chunk_size: usize,
    /// Finalization sweep period
    pub sweep_interval_ms: u64,
    /// Expired-exclusion purge period
    pub exclusion_cleanup_interval_ms: u64,
    /// Re-trigger suppression after a sighting closes (0 disables)
    pub exclusion_ms: u64,
    /// Sessions with fewer readings are discarded without a sighting
    pub min_readings: u32,
    /// Capacity of the channel behind [`ChannelSink`](crate::ChannelSink)
    pub sighting_channel_capacity: usize,
    pub policy: FinalizationPolicy,
    pub serial: SerialSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5000,
            read_timeout_ms: 50,
            read_chunk_size: 256,
            sweep_interval_ms: 100,
            exclusion_cleanup_interval_ms: 10_000,
            exclusion_ms: 600_000,
            min_readings: 1,
            sighting_channel_capacity: 1024,
            policy: FinalizationPolicy::default(),
            serial: SerialSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| IngestError::config("YAML parsing", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading pipeline configuration from {}", path.display());

        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| IngestError::config("YAML encoding", e.to_string()))
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(IngestError::config("queue_capacity", "must be at least 1"));
        }
        if self.read_chunk_size == 0 {
            return Err(IngestError::config("read_chunk_size", "must be at least 1"));
        }
        if self.read_timeout_ms == 0 {
            return Err(IngestError::config("read_timeout_ms", "must be at least 1"));
        }
        if self.sweep_interval_ms == 0 || self.exclusion_cleanup_interval_ms == 0 {
            return Err(IngestError::config("sweep intervals", "must be at least 1 ms"));
        }
        if self.sighting_channel_capacity == 0 {
            return Err(IngestError::config("sighting_channel_capacity", "must be at least 1"));
        }
        if self.min_readings == 0 {
            return Err(IngestError::config("min_readings", "must be at least 1"));
        }
        if self.policy.threshold().is_zero() {
            return Err(IngestError::config("policy", "threshold must be positive"));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn exclusion_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.exclusion_cleanup_interval_ms)
    }

    pub fn exclusion(&self) -> Duration {
        Duration::from_millis(self.exclusion_ms)
    }
}
