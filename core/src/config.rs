//! Executor configuration.
//!
//! # Design
//! `ExecutorConfig` is plain serde data so it can be embedded in a larger
//! TOML file or built in code. It is validated once when an executor is
//! constructed and never changes afterwards.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

const BASE_URL_SCHEMES: &[&str] = &["http", "https"];
const PROXY_URL_SCHEMES: &[&str] = &["http", "https", "socks4", "socks5"];

/// Settings for a `ProxyRequestExecutor`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Origin requests are addressed to, e.g. `https://api.example.org/`.
    pub base_url: String,

    /// Proxy every request is sent through, e.g. `http://127.0.0.1:8080`.
    pub proxy_url: String,

    /// Log every exchange at `INFO` instead of `DEBUG`.
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Responses with a larger body fail with a protocol error.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
}

/// Timeouts applied by the transfer engine.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment to the proxy, in seconds.
    pub connect_secs: u64,

    /// Whole exchange, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

fn default_max_response_bytes() -> u64 {
    10 * 1024 * 1024
}

impl ExecutorConfig {
    pub fn new(base_url: impl Into<String>, proxy_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy_url: proxy_url.into(),
            verbose: false,
            timeouts: TimeoutConfig::default(),
            max_response_bytes: default_max_response_bytes(),
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExecutorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("base_url", &self.base_url, BASE_URL_SCHEMES)?;
        check_url("proxy_url", &self.proxy_url, PROXY_URL_SCHEMES)?;
        if self.timeouts.connect_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "timeouts.connect_secs",
            });
        }
        if self.timeouts.request_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "timeouts.request_secs",
            });
        }
        Ok(())
    }
}

fn check_url(field: &'static str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::EmptyUrl { field });
    }
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        field,
        url: raw.to_string(),
        source,
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            field,
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::MissingHost {
            field,
            url: raw.to_string(),
        });
    }
    Ok(url)
}
