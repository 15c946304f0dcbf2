//! Configuration management for slack-session
//!
//! Settings are persisted as JSON in the platform config directory. A missing
//! or unreadable file falls back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_SERVICE;
use crate::platform;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Slack Web API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Keychain service under which extracted credentials are cached
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
    /// Keychain service holding Slack's cookie master key
    #[serde(default = "default_safe_storage_service")]
    pub safe_storage_service: String,
    /// Keychain accounts probed, in order, for the master key
    #[serde(default = "default_safe_storage_accounts")]
    pub safe_storage_accounts: Vec<String>,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Slack data directories to probe; empty means the platform defaults
    #[serde(default)]
    pub data_dirs: Vec<PathBuf>,
    /// Timeout for the validation request in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_keyring_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_safe_storage_service() -> String {
    "Slack Safe Storage".to_string()
}

fn default_safe_storage_accounts() -> Vec<String> {
    vec![
        "Slack Key".to_string(),
        "Slack App Store Key".to_string(),
        "Slack".to_string(),
    ]
}

fn default_cookie_name() -> String {
    "d".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            keyring_service: default_keyring_service(),
            safe_storage_service: default_safe_storage_service(),
            safe_storage_accounts: default_safe_storage_accounts(),
            cookie_name: default_cookie_name(),
            data_dirs: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Gets the config directory path (cross-platform)
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("slack-session"))
    }

    /// Gets the config file path
    fn config_path() -> Option<PathBuf> {
        Some(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from disk
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => return config,
                        Err(e) => tracing::warn!("Ignoring invalid config {:?}: {}", path, e),
                    },
                    Err(e) => tracing::warn!("Failed to read config {:?}: {}", path, e),
                }
            }
        }
        Self::default()
    }

    /// Saves configuration to disk
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir().ok_or("Could not determine config path")?;
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create config dir: {}", e))?;

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(dir.join("config.json"), content)
            .map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// Slack data directories to probe, in order
    pub fn resolved_data_dirs(&self) -> Vec<PathBuf> {
        if self.data_dirs.is_empty() {
            platform::slack_data_dirs()
        } else {
            self.data_dirs.clone()
        }
    }

    /// Timeout for the validation request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
