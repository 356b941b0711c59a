//! CLI configuration management

use crate::detail::DetailTab;
use crate::scope::RetryPolicy;
use crate::view::Filter;
use anyhow::{Context, Result};
use netpane_common::constants;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netpane")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".netpane")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Get the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure all config directories exist
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()).context("Failed to create config directory")?;
    fs::create_dir_all(logs_dir()).context("Failed to create logs directory")?;
    Ok(())
}

/// Main configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter applied when the panel opens
    pub default_filter: Filter,

    /// Detail tab shown first
    pub default_tab: DetailTab,

    /// Preferred inspector port (default: 4040)
    pub inspector_port: u16,

    /// Scope resolution attempts before giving up
    pub scope_retry_attempts: u32,

    /// Delay between scope resolution attempts
    pub scope_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_filter: Filter::All,
            default_tab: DetailTab::Headers,
            inspector_port: constants::DEFAULT_INSPECTOR_PORT,
            scope_retry_attempts: constants::SCOPE_RESOLVE_ATTEMPTS,
            scope_retry_delay_ms: constants::SCOPE_RETRY_DELAY_MS,
        }
    }
}

impl Config {
    /// Load config from file, defaults when it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        self.save_to(&config_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.scope_retry_attempts.max(1),
            delay: Duration::from_millis(self.scope_retry_delay_ms),
        }
    }
}
