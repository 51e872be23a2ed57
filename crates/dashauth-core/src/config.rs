//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the dashboard base URL, session timing overrides, the
//! storage backend and the last used username.
//!
//! Configuration is stored at `~/.config/dashauth/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "dashauth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the configured base URL
pub const BASE_URL_ENV: &str = "DASHAUTH_API_URL";

/// Backend used when nothing else is configured (the dashboard's dev server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8003";

/// How long before expiry a credential counts as "near expiry".
/// 10 minutes gives the monitor two chances at its default interval.
const DEFAULT_REFRESH_LEAD_SECS: u64 = 600;

/// Expiry monitor tick interval.
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 300;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Runtime settings for a [`crate::SessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_url: String,
    pub refresh_lead: Duration,
    pub monitor_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_lead: Duration::from_secs(DEFAULT_REFRESH_LEAD_SECS),
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn lead_time(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_lead)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_REFRESH_LEAD_SECS as i64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS keychain.
    #[default]
    Keyring,
    /// `session.json` in the cache directory.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub last_username: Option<String>,
    #[serde(default)]
    pub storage: StorageBackend,
    pub refresh_lead_secs: Option<u64>,
    pub monitor_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Resolve the base URL: environment, then config file, then default.
    pub fn base_url(&self) -> String {
        std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            base_url: self.base_url(),
            refresh_lead: self
                .refresh_lead_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_lead),
            monitor_interval: self
                .monitor_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.monitor_interval),
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}
