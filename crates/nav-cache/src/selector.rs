//! Strategy selection.

use tracing::trace;
use url::Url;

use crate::config::RequestConfig;
use crate::error::CacheError;
use crate::pattern::UrlMatcher;
use crate::strategy::FetchingStrategy;

/// Pick the strategy for a URL.
///
/// Lists are tested in [`FetchingStrategy::PRIORITY`] order and the first
/// match wins; the configured default applies otherwise. With no default
/// and no match the configuration is incomplete.
pub fn select_strategy(
    url: &Url,
    config: &RequestConfig,
    matcher: &dyn UrlMatcher,
) -> Result<FetchingStrategy, CacheError> {
    for strategy in FetchingStrategy::PRIORITY {
        if let Some(pattern) = config
            .patterns_for(strategy)
            .iter()
            .find(|p| matcher.test(p, url))
        {
            trace!(url = %url, strategy = %strategy, pattern = %pattern, "strategy matched");
            return Ok(strategy);
        }
    }

    config
        .default_fetching_strategy
        .inspect(|strategy| trace!(url = %url, strategy = %strategy, "default strategy"))
        .ok_or_else(|| CacheError::NoStrategy(url.to_string()))
}
