//! Client configuration
//!
//! The API location is resolved in order of priority:
//! 1. `MAILBOARD_API_BASE_URL` environment variable
//! 2. JSON file (~/.config/mailboard/client.json)
//! 3. Built-in defaults (local development server)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Config filename in the mailboard config directory
const CONFIG_FILE: &str = "client.json";

const BASE_URL_ENV: &str = "MAILBOARD_API_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_API_PREFIX: &str = "/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where and how to reach the mail REST API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and host of the API server
    pub base_url: String,
    /// Path prefix every endpoint lives under
    pub api_prefix: String,
    /// Per-request timeout applied by the HTTP transport
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the config file, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut cfg = if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)?
        } else {
            Self::default()
        };

        if let Ok(base_url) = std::env::var(BASE_URL_ENV)
            && !base_url.trim().is_empty()
        {
            cfg.base_url = base_url.trim().to_string();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg: Self = config::load_json_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("Failed to parse client config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Full URL of the API root, e.g. `http://localhost:8000/api/v1`
    pub fn api_url(&self) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        );
        Url::parse(&joined).with_context(|| format!("Invalid API base URL: {}", joined))
    }

    /// Write the configuration as JSON to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        config::save_json_file(path, self)
    }

    /// Default config file path (~/.config/mailboard/client.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    fn validate(&self) -> Result<()> {
        self.api_url().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.api_url().unwrap().as_str(), "http://localhost:8000/api/v1");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = ClientConfig::from_json(r#"{ "base_url": "https://mail.example.com/" }"#).unwrap();
        assert_eq!(cfg.base_url, "https://mail.example.com/");
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(
            cfg.api_url().unwrap().as_str(),
            "https://mail.example.com/api/v1"
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        let cfg = ClientConfig {
            timeout_secs: 5,
            ..ClientConfig::default()
        };

        cfg.save(&path).unwrap();
        assert_eq!(ClientConfig::from_file(&path).unwrap(), cfg);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ClientConfig::from_json(r#"{ "base_url": "not a url" }"#).is_err());
    }
}
