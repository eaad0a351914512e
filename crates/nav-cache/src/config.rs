//! Request caching configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CacheError;
use crate::pattern::{PathTemplateMatcher, UrlMatcher};
use crate::strategy::FetchingStrategy;

/// Default cache name.
pub const DEFAULT_CACHE_NAME: &str = "webflo";

/// Suffix of the JSON-variant cache partition.
pub const JSON_PARTITION_SUFFIX: &str = "_json";

fn loaded_default_strategy() -> Option<FetchingStrategy> {
    Some(FetchingStrategy::NetworkFirst)
}

/// Pattern lists and default strategy driving strategy selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Name of the default cache partition.
    pub cache_name: String,
    pub cache_only_urls: Vec<String>,
    pub network_only_urls: Vec<String>,
    pub cache_first_urls: Vec<String>,
    pub network_first_urls: Vec<String>,
    /// Strategy used when no list matches. Loaded configs default to
    /// `network-first` when the field is absent.
    #[serde(default = "loaded_default_strategy")]
    pub default_fetching_strategy: Option<FetchingStrategy>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            cache_only_urls: Vec::new(),
            network_only_urls: Vec::new(),
            cache_first_urls: Vec::new(),
            network_first_urls: Vec::new(),
            default_fetching_strategy: None,
        }
    }
}

fn collect(urls: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    urls.into_iter().map(Into::into).collect()
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn with_cache_only(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cache_only_urls = collect(urls);
        self
    }

    pub fn with_network_only(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.network_only_urls = collect(urls);
        self
    }

    pub fn with_cache_first(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cache_first_urls = collect(urls);
        self
    }

    pub fn with_network_first(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.network_first_urls = collect(urls);
        self
    }

    pub fn with_default_strategy(mut self, strategy: FetchingStrategy) -> Self {
        self.default_fetching_strategy = Some(strategy);
        self
    }

    pub fn without_default_strategy(mut self) -> Self {
        self.default_fetching_strategy = None;
        self
    }

    /// The pattern list for a strategy.
    pub fn patterns_for(&self, strategy: FetchingStrategy) -> &[String] {
        match strategy {
            FetchingStrategy::CacheOnly => &self.cache_only_urls,
            FetchingStrategy::NetworkOnly => &self.network_only_urls,
            FetchingStrategy::CacheFirst => &self.cache_first_urls,
            FetchingStrategy::NetworkFirst => &self.network_first_urls,
        }
    }

    /// Name of the JSON-variant partition.
    pub fn json_cache_name(&self) -> String {
        format!("{}{JSON_PARTITION_SUFFIX}", self.cache_name)
    }

    /// Copy with every pattern trimmed and empty patterns dropped.
    pub fn normalized(&self) -> Self {
        let clean = |urls: &[String]| -> Vec<String> {
            urls.iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect()
        };
        Self {
            cache_name: self.cache_name.trim().to_string(),
            cache_only_urls: clean(&self.cache_only_urls),
            network_only_urls: clean(&self.network_only_urls),
            cache_first_urls: clean(&self.cache_first_urls),
            network_first_urls: clean(&self.network_first_urls),
            default_fetching_strategy: self.default_fetching_strategy,
        }
    }

    /// Check the cache name and that every pattern resolves against `origin`.
    pub fn validate(&self, origin: &Url) -> Result<(), CacheError> {
        if self.cache_name.trim().is_empty() {
            return Err(CacheError::InvalidConfig("cache_name must not be empty".into()));
        }
        let matcher = PathTemplateMatcher::new(origin.clone());
        for strategy in FetchingStrategy::PRIORITY {
            for pattern in self.patterns_for(strategy) {
                if pattern.trim().is_empty() {
                    continue;
                }
                if matcher.resolve(pattern).is_none() {
                    return Err(CacheError::InvalidConfig(format!(
                        "{strategy} pattern {pattern:?} does not resolve against {origin}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Non-pattern URLs of the cache-first and cache-only lists, resolved
    /// against the origin. These are fetched ahead of time on install.
    pub fn precache_urls(&self, origin: &Url, matcher: &dyn UrlMatcher) -> Vec<Url> {
        let normalized = self.normalized();
        normalized
            .cache_first_urls
            .iter()
            .chain(normalized.cache_only_urls.iter())
            .filter(|u| !matcher.is_pattern(u))
            .filter_map(|u| origin.join(u).ok())
            .collect()
    }
}
