//! Navigator configuration.

use std::path::Path;

use anyhow::{Context, Result};
use nav_cache::RequestConfig;
use nav_data::{RetryPolicy, TimeoutConfig};
use nav_observability::LoggingConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DispatchError;

/// Navigator configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorConfig {
    /// Origin the navigator serves; cache patterns resolve against it.
    pub origin: Url,

    /// Strategy pattern lists and cache name.
    #[serde(default)]
    pub cache: RequestConfig,

    /// Limits on the Retry-After loop.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Log level and format.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Add the default navigation headers to every request.
    #[serde(default = "default_true")]
    pub request_defaults: bool,

    /// Total timeout for remote transport calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

fn default_true() -> bool {
    true
}

impl NavigatorConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            cache: RequestConfig::default(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
            request_defaults: true,
            timeout: None,
        }
    }

    pub fn with_cache(mut self, cache: RequestConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_request_defaults(mut self, enabled: bool) -> Self {
        self.request_defaults = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Load config from a TOML file, or JSON when the path ends in `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Check the origin scheme, the cache patterns and the log level.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(DispatchError::Config(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        self.cache
            .validate(&self.origin)
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        self.logging
            .level_filter()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}
