// Application Configuration

use anyhow::{Context, Result};
use lorascope_hal::HalConfig;
use lorascope_scanner::{FrequencyPlan, ListenerConfig, ScannerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Start scanning as soon as the radio is up
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    /// Frame poll tick inside an RX window (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause between RX windows (ms)
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,

    /// How long stop waits for the scan worker (ms)
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,

    /// Statistics refresh period (ms)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,

    /// Frequencies silent for longer than this are forgotten (ms)
    #[serde(default = "default_max_age")]
    pub stats_max_age_ms: u64,

    /// Status report period (s)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Radio module selection
    #[serde(default)]
    pub hal: HalConfig,

    /// Frequency range and radio parameters
    #[serde(default)]
    pub plan: FrequencyPlan,

    /// Survey sweep settings
    #[serde(default)]
    pub sweep: ScannerConfig,

    /// Path to config file (for reference)
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_auto_start() -> bool { true }
fn default_poll_interval() -> u64 { 10 }
fn default_idle_interval() -> u64 { 100 }
fn default_stop_grace() -> u64 { 100 }
fn default_stats_interval() -> u64 { 1000 }
fn default_max_age() -> u64 { 5 * 60 * 1000 }
fn default_status_interval() -> u64 { 10 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_start: default_auto_start(),
            poll_interval_ms: default_poll_interval(),
            idle_interval_ms: default_idle_interval(),
            stop_grace_ms: default_stop_grace(),
            stats_interval_ms: default_stats_interval(),
            stats_max_age_ms: default_max_age(),
            status_interval_secs: default_status_interval(),
            hal: HalConfig::default(),
            plan: FrequencyPlan::default(),
            sweep: ScannerConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from standard paths
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("/etc/lorascope/config.toml"),
            dirs::config_dir()
                .map(|p| p.join("lorascope/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("./config.toml"),
        ];

        for path in &config_paths {
            if path.is_file() {
                return Self::load_from(path);
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Explicit path if given, otherwise the standard search
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Listener settings derived from the plan and timing fields
    // Only the daemon runs a listener
    #[allow(dead_code)]
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            poll_interval_ms: self.poll_interval_ms,
            idle_interval_ms: self.idle_interval_ms,
            stop_grace_ms: self.stop_grace_ms,
            ..self.plan.listener_config()
        }
    }

    /// Generate example configuration
    // Only the CLI writes one
    #[allow(dead_code)]
    pub fn example() -> String {
        let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        format!(
            "# LoRaScope Configuration File\n\
             #\n\
             # Copy this file to /etc/lorascope/config.toml or ~/.config/lorascope/config.toml\n\
             # Module: e220-433, e220-868, e220-915 or simulated\n\n{}",
            body
        )
    }
}

/// Helper for getting config directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
