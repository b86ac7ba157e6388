//! Configuration types for ordersync components.
//!
//! Every tunable has a `Default`. An optional TOML file can override any of
//! them; sections and keys that are absent keep their defaults:
//!
//! ```toml
//! [db]
//! max_connections = 10
//!
//! [http]
//! timeout_secs = 20
//!
//! [sync]
//! page_limit = 200
//! deduction_policy = "on_every_upsert"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::sync::DeductionPolicy;

/// Database connection pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for the channel API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// Order synchronization configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Page size requested from the channel order list.
    pub page_limit: u32,
    /// Upper bound on pages fetched per run.
    pub max_pages: u32,
    /// Window used when no start date is given.
    pub default_lookback_days: i64,
    pub deduction_policy: DeductionPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: 100,
            max_pages: 50,
            default_lookback_days: 7,
            deduction_policy: DeductionPolicy::default(),
        }
    }
}

/// Contents of the optional configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub db: DbConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
}

/// Returns `<config dir>/ordersync/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ordersync").join("config.toml"))
}

/// Loads configuration from `path`, or from [`default_config_path`] when `None`.
///
/// A missing file at the default location yields defaults. A missing file at
/// an explicitly given path is an error.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig, AppError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(FileConfig::default()),
        },
    };

    if !path.exists() {
        if explicit {
            return Err(AppError::ConfigError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(FileConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))
}
