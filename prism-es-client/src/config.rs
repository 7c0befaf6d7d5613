//! Client configuration
//!
//! ```toml
//! [connection]
//! url = "http://localhost:9200"
//! request_timeout_ms = 30000
//!
//! [execution]
//! concurrent_batch = 10
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::Result;
use prism_es_query::ExecutionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Overrides `connection.url` when set
pub const URL_ENV: &str = "PRISM_ES_URL";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Make writes visible to search before returning
    #[serde(default = "default_refresh")]
    pub refresh: bool,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_refresh() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            refresh: default_refresh(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_url_override(std::env::var(URL_ENV).ok());
        Ok(config)
    }

    /// Like [`Config::load`], falling back to defaults when the file is absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                let mut config = Self::default();
                config.apply_url_override(std::env::var(URL_ENV).ok());
                Ok(config)
            }
        }
    }

    pub fn apply_url_override(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.connection.url = url;
        }
    }
}
