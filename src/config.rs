//! Monitor configuration.
//!
//! All configuration is loaded externally and injected into the registry
//! and scheduler as plain values at startup; the core keeps no persisted
//! state of its own. A missing or unreadable config file falls back to
//! defaults.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_interval_secs() -> f64 {
    1.0
}

fn default_capacity() -> usize {
    60
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_enabled() -> bool {
    true
}

/// Intervals above this are treated as configuration mistakes.
const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Convert a configured interval to a `Duration`, rejecting values that
/// `Duration::from_secs_f64` would panic on (negative, NaN, huge) along
/// with zero.
pub(crate) fn checked_interval(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 && secs <= MAX_INTERVAL_SECS {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Per-plugin overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOverrides {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub interval_secs: Option<f64>,
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for PluginOverrides {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: None,
            capacity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Fallback refresh interval for plugins without an override and
    /// without a descriptor default.
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: f64,
    /// Ring buffer capacity for streams without a per-plugin override.
    #[serde(default = "default_capacity")]
    pub default_capacity: usize,
    /// Consecutive failures before a plugin is disabled.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// User plugin directory; defaults to `~/.upmon/plugins`.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
    #[serde(default)]
    pub plugins: HashMap<String, PluginOverrides>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            default_capacity: default_capacity(),
            failure_threshold: default_failure_threshold(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            plugin_dir: None,
            plugins: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Load from the default location, falling back to defaults when the
    /// file is missing or corrupted.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        if data.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("config file {:?} unreadable ({}), using defaults", path, e);
            Self::default()
        }))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let data = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, data).with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("upmon").join("config.json"))
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".upmon")
                .join("plugins")
        })
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.plugins.get(name).map(|p| p.enabled).unwrap_or(true)
    }

    /// Resolved refresh interval: override, then descriptor default. An
    /// override that is not a usable interval falls back with a warning
    /// instead of taking the process down.
    pub fn interval_for(&self, name: &str, descriptor_default: Duration) -> Duration {
        match self.plugins.get(name).and_then(|p| p.interval_secs) {
            Some(secs) => checked_interval(secs).unwrap_or_else(|| {
                log::warn!(
                    "invalid interval_secs {} for plugin '{}', using {:?}",
                    secs,
                    name,
                    descriptor_default
                );
                descriptor_default
            }),
            None => descriptor_default,
        }
    }

    /// Resolved ring buffer capacity for a plugin's streams.
    pub fn capacity_for(&self, name: &str) -> usize {
        self.plugins
            .get(name)
            .and_then(|p| p.capacity)
            .unwrap_or(self.default_capacity)
    }

    /// Fallback interval for plugins that declare none of their own
    /// (manifest plugins without `interval_secs`).
    pub fn default_interval(&self) -> Duration {
        checked_interval(self.default_interval_secs).unwrap_or_else(|| {
            log::warn!(
                "invalid default_interval_secs {}, using 1s",
                self.default_interval_secs
            );
            Duration::from_secs(1)
        })
    }
}
