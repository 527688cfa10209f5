//! Configuration parsing and validation.
//!
//! kitmax configuration is loaded from TOML files with CLI overrides.

use crate::pipeline::aggregator::ReconcileMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level kitmax configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis connection configuration.
    pub redis: RedisConfig,

    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Keyspace subscriber configuration.
    #[serde(default)]
    pub subscriber: SubscriberConfig,

    /// Telemetry and logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Logical database index.
    #[serde(default)]
    pub db: u32,

    /// ACL user name (requires `password`).
    #[serde(default)]
    pub username: Option<String>,

    /// Password sent with AUTH on connect.
    #[serde(default)]
    pub password: Option<String>,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-command timeout in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Value for `CONFIG SET notify-keyspace-events` sent at startup.
    #[serde(default)]
    pub notify_keyspace_events: Option<String>,
}

impl RedisConfig {
    /// `host:port` address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Command timeout as a duration.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Glob pattern of record keys to watch.
    #[serde(default = "default_record_pattern")]
    pub record_pattern: String,

    /// How summaries are reconciled.
    #[serde(default)]
    pub reconcile_mode: ReconcileMode,

    /// Maximum concurrently running handler invocations.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Skip events reporting a removed record.
    #[serde(default = "default_true")]
    pub ignore_removals: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            record_pattern: default_record_pattern(),
            reconcile_mode: ReconcileMode::default(),
            max_in_flight: default_max_in_flight(),
            ignore_removals: true,
        }
    }
}

/// Keyspace subscriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Initial reconnect backoff in milliseconds.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Upper bound for the reconnect backoff in milliseconds.
    #[serde(default = "default_reconnect_backoff_max_ms")]
    pub reconnect_backoff_max_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_backoff_max_ms: default_reconnect_backoff_max_ms(),
        }
    }
}

/// Telemetry and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval between pipeline stats log lines (0 disables).
    #[serde(default = "default_stats_interval_seconds")]
    pub stats_interval_seconds: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats_interval_seconds: default_stats_interval_seconds(),
        }
    }
}

// Default value functions

fn default_redis_port() -> u16 {
    6379
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    5_000
}

fn default_pool_size() -> usize {
    8
}

fn default_record_pattern() -> String {
    "tile:*".to_string()
}

fn default_max_in_flight() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_reconnect_backoff_ms() -> u64 {
    500
}

fn default_reconnect_backoff_max_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval_seconds() -> u64 {
    60
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref host) = overrides.redis_host {
            self.redis.host = host.clone();
        }
        if let Some(port) = overrides.redis_port {
            self.redis.port = port;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_redis()?;
        self.validate_pipeline()?;
        self.validate_subscriber()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_redis(&self) -> Result<()> {
        if self.redis.host.trim().is_empty() {
            anyhow::bail!("redis.host must not be empty");
        }
        if self.redis.connect_timeout_ms == 0 {
            anyhow::bail!("redis.connect_timeout_ms must be > 0");
        }
        if self.redis.command_timeout_ms == 0 {
            anyhow::bail!("redis.command_timeout_ms must be > 0");
        }
        if self.redis.pool_size == 0 {
            anyhow::bail!("redis.pool_size must be > 0");
        }
        if self.redis.username.is_some() && self.redis.password.is_none() {
            anyhow::bail!("redis.password required when redis.username is set");
        }
        Ok(())
    }

    fn validate_pipeline(&self) -> Result<()> {
        if self.pipeline.record_pattern.is_empty() {
            anyhow::bail!("pipeline.record_pattern must not be empty");
        }
        if self.pipeline.max_in_flight == 0 {
            anyhow::bail!("pipeline.max_in_flight must be > 0");
        }
        Ok(())
    }

    fn validate_subscriber(&self) -> Result<()> {
        if self.subscriber.reconnect_backoff_ms == 0 {
            anyhow::bail!("subscriber.reconnect_backoff_ms must be > 0");
        }
        if self.subscriber.reconnect_backoff_ms > self.subscriber.reconnect_backoff_max_ms {
            anyhow::bail!(
                "subscriber.reconnect_backoff_ms ({}) cannot exceed reconnect_backoff_max_ms ({})",
                self.subscriber.reconnect_backoff_ms,
                self.subscriber.reconnect_backoff_max_ms
            );
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override Redis host.
    pub redis_host: Option<String>,
    /// Override Redis port.
    pub redis_port: Option<u16>,
}
