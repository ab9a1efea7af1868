//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`--config <path>` or the default locations)
//! - Environment variables (`MART_HOST`, `MART_PORT`)

use anyhow::{Context, Result};
use mart_core::{ChannelConfig, OverflowPolicy, RetryPolicy};
use mart_protocol::Limits;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Defaults for channels created without explicit parameters.
    #[serde(default)]
    pub channel: ChannelDefaults,

    /// Request limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Long-poll behaviour.
    #[serde(default)]
    pub poll: PollConfig,

    /// Persistence configuration.
    #[serde(default)]
    pub persist: PersistConfig,

    /// Expiry sweep configuration.
    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Channel defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDefaults {
    /// Retained messages per channel.
    #[serde(default = "default_channel_size")]
    pub size: usize,

    /// Advisory retention in nanoseconds.
    #[serde(default = "default_channel_life_ns")]
    pub life_ns: u64,
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum published payload in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum channel capacity a publisher may request.
    #[serde(default = "default_max_channel_size")]
    pub max_channel_size: usize,
}

/// Long-poll configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollConfig {
    /// How long a poll may stay parked, in milliseconds. `0` parks until the
    /// client goes away.
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Persist channels to SQLite and restore them at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file.
    #[serde(default = "default_persist_path")]
    pub path: PathBuf,

    /// Events buffered between channels and the database writer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// What a full queue does: `block` or `drop_oldest`.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Retry schedule for failed writes.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Write retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First retry delay in milliseconds.
    #[serde(default = "default_retry_min_ms")]
    pub min_delay_ms: u64,

    /// Largest retry delay in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub max_delay_ms: u64,

    /// Retries before an event is dropped.
    #[serde(default = "default_retry_times")]
    pub max_times: usize,
}

/// Expiry sweep configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Interval between sweeps in milliseconds. `0` disables sweeping.
    #[serde(default)]
    pub sweep_interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    54321
}

fn default_true() -> bool {
    true
}

fn default_channel_size() -> usize {
    mart_core::channel::DEFAULT_CAPACITY
}

fn default_channel_life_ns() -> u64 {
    3_600_000_000_000 // one hour
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_channel_size() -> usize {
    10_000
}

fn default_persist_path() -> PathBuf {
    PathBuf::from("persist.db")
}

fn default_queue_capacity() -> usize {
    mart_core::queue::DEFAULT_QUEUE_CAPACITY
}

fn default_retry_min_ms() -> u64 {
    50
}

fn default_retry_max_ms() -> u64 {
    5_000
}

fn default_retry_times() -> usize {
    8
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            channel: ChannelDefaults::default(),
            limits: LimitsConfig::default(),
            poll: PollConfig::default(),
            persist: PersistConfig::default(),
            expiry: ExpiryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            size: default_channel_size(),
            life_ns: default_channel_life_ns(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_channel_size: default_max_channel_size(),
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_persist_path(),
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_retry_min_ms(),
            max_delay_ms: default_retry_max_ms(),
            max_times: default_retry_times(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl ChannelDefaults {
    /// Configuration applied when `/pub` omits `size` or `life`.
    #[must_use]
    pub fn to_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.size).with_life(Duration::from_nanos(self.life_ns))
    }
}

impl LimitsConfig {
    /// Limits enforced by request parsing.
    #[must_use]
    pub fn to_limits(&self) -> Limits {
        Limits {
            max_message_size: self.max_message_size,
            max_channel_size: self.max_channel_size,
        }
    }
}

impl PollConfig {
    /// The poll timeout, `None` when polls may park indefinitely.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl RetryConfig {
    /// Backoff schedule for the durability worker.
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_times: self.max_times,
        }
    }
}

impl ExpiryConfig {
    /// The sweep interval, `None` when sweeping is off.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

impl Config {
    /// Load configuration from `path`, or from the first default location
    /// that exists, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_paths()?,
        };
        config.apply_overrides(
            std::env::var("MART_HOST").ok(),
            std::env::var("MART_PORT").ok(),
        )?;
        Ok(config)
    }

    fn from_default_paths() -> Result<Self> {
        let config_paths = [
            "mart.toml",
            "/etc/mart/mart.toml",
            "~/.config/mart/mart.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply host and port overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `port` is not a valid port number.
    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host.filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let Some(port) = port.filter(|p| !p.is_empty()) {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid MART_PORT: {port}"))?;
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }
}
