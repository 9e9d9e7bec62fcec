//! Configuration resolution for RideLink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (explicit path, or ~/.config/ridelink/settings.json)
//! 3. Environment variables (`RIDELINK_*`)
//! 4. CLI arguments (applied by each binary, highest priority)
//!
//! Secrets (the field-encryption secret) are never read from the settings
//! file; binaries take them from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete RideLink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Location channel server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    /// Per-connection outbound queue; events beyond this are dropped.
    pub outbound_capacity: usize,
    /// How long a long-poll request waits for events before returning empty.
    pub long_poll_window_secs: u64,
    /// Long-poll sessions without a request for this long are closed.
    pub poll_idle_timeout_secs: u64,
    pub offer_sweep_interval_secs: u64,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            outbound_capacity: 64,
            long_poll_window_secs: 20,
            poll_idle_timeout_secs: 60,
            offer_sweep_interval_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    pub const fn long_poll_window(&self) -> Duration {
        Duration::from_secs(self.long_poll_window_secs)
    }

    pub const fn poll_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_idle_timeout_secs)
    }

    pub const fn offer_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.offer_sweep_interval_secs)
    }
}

/// Driver-device configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Base URL of the relay (HTTP API and location channel).
    pub relay_url: String,
    pub offer_poll_interval_ms: u64,
    pub retry: RetrySettings,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8080".to_string(),
            offer_poll_interval_ms: 2000,
            retry: RetrySettings::default(),
        }
    }
}

impl DriverConfig {
    pub const fn offer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.offer_poll_interval_ms)
    }
}

/// Serializable retry parameters; the driver crate turns these into a policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            timeout_ms: 30_000,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit path must exist; the global path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(path) if path.exists() => load_config_file(&path)?,
            _ => Config::default(),
        },
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ridelink").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `RIDELINK_*` overrides. Unparseable numeric values are ignored.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("RIDELINK_LISTEN_ADDR") {
        config.relay.listen_addr = val;
    }
    if let Some(n) = lookup("RIDELINK_OUTBOUND_CAPACITY").and_then(|v| v.parse().ok()) {
        config.relay.outbound_capacity = n;
    }
    if let Some(n) = lookup("RIDELINK_LONG_POLL_WINDOW_SECS").and_then(|v| v.parse().ok()) {
        config.relay.long_poll_window_secs = n;
    }
    if let Some(n) = lookup("RIDELINK_POLL_IDLE_SECS").and_then(|v| v.parse().ok()) {
        config.relay.poll_idle_timeout_secs = n;
    }
    if let Some(n) = lookup("RIDELINK_OFFER_SWEEP_SECS").and_then(|v| v.parse().ok()) {
        config.relay.offer_sweep_interval_secs = n;
    }
    if let Some(val) = lookup("RIDELINK_LOG_LEVEL") {
        config.relay.log_level = val;
    }
    if let Some(val) = lookup("RIDELINK_RELAY_URL") {
        config.driver.relay_url = val;
    }
    if let Some(n) = lookup("RIDELINK_OFFER_POLL_MS").and_then(|v| v.parse().ok()) {
        config.driver.offer_poll_interval_ms = n;
    }
    if let Some(n) = lookup("RIDELINK_MAX_RETRIES").and_then(|v| v.parse().ok()) {
        config.driver.retry.max_retries = n;
    }
}
