//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote collector configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
}

/// Sampler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

/// Durable queue configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files. Empty disables file logging.
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_address() -> String { "127.0.0.1:5555".to_string() }
fn default_send_timeout_ms() -> u64 { crate::sync::client::DEFAULT_SEND_TIMEOUT_MS }
fn default_receive_timeout_ms() -> u64 { crate::sync::client::DEFAULT_RECEIVE_TIMEOUT_MS }

fn default_interval_ms() -> u64 { crate::sampler::DEFAULT_SAMPLE_INTERVAL_MS }
fn default_snapshot_path() -> String { "./snapshot.json".to_string() }

fn default_queue_path() -> String { "./pending.jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            send_timeout_ms: default_send_timeout_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { path: default_queue_path() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl CollectorConfig {
    /// Send timeout as a `Duration`
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Receive timeout as a `Duration`
    #[must_use]
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

impl SamplerConfig {
    /// Sampling period as a `Duration`
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Check that an address has the `host:port` shape with a numeric port.
///
/// The host part is not resolved here; resolution happens on connect.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

fn invalid(msg: impl std::fmt::Display) -> SyncError {
    SyncError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cell_telemetry_sync::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.collector.address.is_empty() {
            return Err(invalid("collector address cannot be empty"));
        }

        if !is_valid_address(&self.collector.address) {
            return Err(invalid(format!(
                "collector address '{}' must be host:port",
                self.collector.address
            )));
        }

        for (name, value) in [
            ("send_timeout_ms", self.collector.send_timeout_ms),
            ("receive_timeout_ms", self.collector.receive_timeout_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(invalid(format!("{} must be between 1 and 60000", name)));
            }
        }

        if self.sampler.interval_ms < 100 || self.sampler.interval_ms > 3_600_000 {
            return Err(invalid("interval_ms must be between 100 and 3600000"));
        }

        if self.sampler.snapshot_path.is_empty() {
            return Err(invalid("snapshot_path cannot be empty"));
        }

        if self.queue.path.is_empty() {
            return Err(invalid("queue path cannot be empty"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
