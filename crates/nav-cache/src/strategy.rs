//! Caching strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// The strategy governing a delegated fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchingStrategy {
    /// Read the cache only; never touch the network.
    CacheOnly,
    /// Go to the network only; no cache read or write.
    NetworkOnly,
    /// Serve from cache, refresh in the background; network on miss.
    CacheFirst,
    /// Go to the network, refresh the cache; cache on transport failure.
    NetworkFirst,
}

impl FetchingStrategy {
    /// Pattern lists are tested in this order; the first match wins.
    pub const PRIORITY: [FetchingStrategy; 4] = [
        Self::CacheOnly,
        Self::NetworkOnly,
        Self::CacheFirst,
        Self::NetworkFirst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheOnly => "cache-only",
            Self::NetworkOnly => "network-only",
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
        }
    }

    /// Whether the strategy ever reads the cache.
    pub fn reads_cache(&self) -> bool {
        !matches!(self, Self::NetworkOnly)
    }

    /// Whether the strategy ever reaches the network.
    pub fn reads_network(&self) -> bool {
        !matches!(self, Self::CacheOnly)
    }
}

impl fmt::Display for FetchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchingStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cache-only" => Ok(Self::CacheOnly),
            "network-only" => Ok(Self::NetworkOnly),
            "cache-first" => Ok(Self::CacheFirst),
            "network-first" => Ok(Self::NetworkFirst),
            other => Err(CacheError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Where an executor's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchSource {
    /// Served from the cache.
    Cache,
    /// Served from the network.
    Network,
    /// Network failed; served from the cache.
    CacheFallback,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::CacheFallback => write!(f, "cache-fallback"),
        }
    }
}
