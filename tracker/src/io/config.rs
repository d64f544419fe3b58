//! Tracker configuration stored under `.tracker/config.toml`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::atomic::write_atomic;

/// Tracker configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Page size used by `list` when the caller gives no limit.
    pub default_list_limit: usize,

    /// Upper bound on any requested page size.
    pub max_list_limit: usize,

    /// Decimal places for voltages in CSV exports.
    pub export_precision: usize,

    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API server binds to.
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_list_limit: 100,
            max_list_limit: 1000,
            export_precision: 2,
            server: ServerConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_list_limit == 0 {
            return Err(anyhow!("default_list_limit must be > 0"));
        }
        if self.max_list_limit < self.default_list_limit {
            return Err(anyhow!("max_list_limit must be >= default_list_limit"));
        }
        if self.export_precision > 6 {
            return Err(anyhow!("export_precision must be <= 6"));
        }
        if self.server.bind.trim().is_empty() {
            return Err(anyhow!("server.bind must not be empty"));
        }
        Ok(())
    }

    /// Clamp a requested page size to the configured bounds.
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_list_limit)
            .min(self.max_list_limit)
    }
}

/// Read `.tracker/config.toml`. An absent file means all defaults.
pub fn load_config(path: &Path) -> Result<TrackerConfig> {
    let config = match fs::read_to_string(path) {
        Ok(text) => toml::from_str::<TrackerConfig>(&text)
            .with_context(|| format!("parse config {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => TrackerConfig::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("read config {}", path.display()));
        }
    };
    config
        .validate()
        .with_context(|| format!("check config {}", path.display()))?;
    Ok(config)
}

/// Validate and persist `config` as pretty TOML.
pub fn write_config(path: &Path, config: &TrackerConfig) -> Result<()> {
    config.validate().context("refusing to write config")?;
    let text = toml::to_string_pretty(config).context("serialize config")?;
    write_atomic(path, &text).with_context(|| format!("write config {}", path.display()))
}
