//! The four strategy executors.

use std::fmt;
use std::sync::Arc;

use nav_core::{Request, Response};
use nav_data::Transport;
use nav_observability::DispatchMetrics;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::config::RequestConfig;
use crate::error::CacheError;
use crate::pattern::UrlMatcher;
use crate::refresh::is_cacheable;
use crate::selector::select_strategy;
use crate::store::{partition_name, CacheStore};
use crate::strategy::{FetchSource, FetchingStrategy};

/// Result of running a strategy.
pub struct FetchOutcome {
    /// The strategy that ran.
    pub strategy: FetchingStrategy,
    /// Where the response came from.
    pub source: FetchSource,
    /// The response, absent on a cache-only miss.
    pub response: Option<Response>,
    /// Background refresh started by a cache-first hit.
    pub refresh: Option<JoinHandle<()>>,
}

impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOutcome")
            .field("strategy", &self.strategy)
            .field("source", &self.source)
            .field("status", &self.response.as_ref().map(|r| r.status))
            .field("refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Runs delegated fetches against a cache store and a remote transport.
#[derive(Clone)]
pub struct StrategyExecutor {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    config: Arc<RequestConfig>,
    matcher: Arc<dyn UrlMatcher>,
    metrics: Arc<DispatchMetrics>,
}

impl StrategyExecutor {
    /// Create an executor. The configuration is normalized once here.
    pub fn new(
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        config: RequestConfig,
        matcher: Arc<dyn UrlMatcher>,
    ) -> Self {
        Self {
            store,
            transport,
            config: Arc::new(config.normalized()),
            matcher,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Share a metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn matcher(&self) -> &Arc<dyn UrlMatcher> {
        &self.matcher
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Pick the strategy for a URL.
    pub fn select(&self, url: &Url) -> Result<FetchingStrategy, CacheError> {
        select_strategy(url, &self.config, self.matcher.as_ref())
    }

    /// Select a strategy for the request and run it.
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome, CacheError> {
        let strategy = self.select(&request.url)?;
        self.execute(strategy, request).await
    }

    /// Run a specific strategy.
    pub async fn execute(
        &self,
        strategy: FetchingStrategy,
        request: Request,
    ) -> Result<FetchOutcome, CacheError> {
        self.metrics.record_strategy(strategy.as_str());
        debug!(url = %request.url, strategy = %strategy, "executing strategy");

        match strategy {
            FetchingStrategy::CacheOnly => {
                let response = self.cache_only(&request).await?;
                Ok(FetchOutcome {
                    strategy,
                    source: FetchSource::Cache,
                    response,
                    refresh: None,
                })
            }
            FetchingStrategy::NetworkOnly => {
                let response = self.network_only(request).await?;
                Ok(FetchOutcome {
                    strategy,
                    source: FetchSource::Network,
                    response: Some(response),
                    refresh: None,
                })
            }
            FetchingStrategy::NetworkFirst => {
                let (response, source) = self.network_first(request).await?;
                Ok(FetchOutcome {
                    strategy,
                    source,
                    response: Some(response),
                    refresh: None,
                })
            }
            FetchingStrategy::CacheFirst => self.cache_first(request).await,
        }
    }

    /// Delegate straight to the transport. No cache read or write.
    pub async fn network_only(&self, request: Request) -> Result<Response, CacheError> {
        Ok(self.transport.fetch(request).await?)
    }

    /// Read the request's partition only. Never touches the network.
    pub async fn cache_only(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        self.cache_match(request).await
    }

    /// Try the transport and refresh the cache on success; fall back to the
    /// cache when the transport fails.
    pub async fn network_first(
        &self,
        request: Request,
    ) -> Result<(Response, FetchSource), CacheError> {
        match self.transport.fetch(request.clone()).await {
            Ok(mut response) => {
                if let Err(e) = self.refresh_cache(&request, &mut response).await {
                    warn!(url = %request.url, error = %e, "cache refresh failed");
                }
                Ok((response, FetchSource::Network))
            }
            Err(transport_error) => {
                warn!(url = %request.url, error = %transport_error, "transport failed, trying cache");
                self.metrics.record_cache_fallback();
                match self.cache_match(&request).await? {
                    Some(cached) => Ok((cached, FetchSource::CacheFallback)),
                    None => Err(CacheError::Transport(transport_error)),
                }
            }
        }
    }

    /// Serve from cache and refresh in the background; go to the network
    /// (seeding the cache) on a miss.
    pub async fn cache_first(&self, request: Request) -> Result<FetchOutcome, CacheError> {
        if let Some(cached) = self.cache_match(&request).await? {
            let refresh = self.spawn_refresh(request);
            return Ok(FetchOutcome {
                strategy: FetchingStrategy::CacheFirst,
                source: FetchSource::Cache,
                response: Some(cached),
                refresh: Some(refresh),
            });
        }

        let mut response = self.transport.fetch(request.clone()).await?;
        if let Err(e) = self.refresh_cache(&request, &mut response).await {
            warn!(url = %request.url, error = %e, "cache seed failed");
        }
        Ok(FetchOutcome {
            strategy: FetchingStrategy::CacheFirst,
            source: FetchSource::Network,
            response: Some(response),
            refresh: None,
        })
    }

    /// Write an independent copy of an eligible response to the request's
    /// partition. Returns whether anything was written.
    pub async fn refresh_cache(
        &self,
        request: &Request,
        response: &mut Response,
    ) -> Result<bool, CacheError> {
        if !is_cacheable(request, response) {
            debug!(url = %request.url, status = %response.status, "response not cacheable");
            return Ok(false);
        }
        let copy = response.duplicate().await?;
        let name = partition_name(&self.config.cache_name, request);
        let partition = self.store.open_partition(&name).await?;
        partition.put(request, copy).await?;
        self.metrics.record_cache_write();
        debug!(url = %request.url, partition = %name, "cache refreshed");
        Ok(true)
    }

    async fn cache_match(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        let name = partition_name(&self.config.cache_name, request);
        let partition = self.store.open_partition(&name).await?;
        let hit = partition.match_request(request).await?;
        if hit.is_some() {
            self.metrics.record_cache_hit();
        } else {
            self.metrics.record_cache_miss();
        }
        debug!(url = %request.url, partition = %name, hit = hit.is_some(), "cache lookup");
        Ok(hit)
    }

    fn spawn_refresh(&self, request: Request) -> JoinHandle<()> {
        let executor = self.clone();
        self.metrics.record_background_refresh();
        tokio::spawn(async move {
            match executor.transport.fetch(request.clone()).await {
                Ok(mut response) => {
                    if let Err(e) = executor.refresh_cache(&request, &mut response).await {
                        warn!(url = %request.url, error = %e, "background refresh write failed");
                    }
                }
                Err(e) => debug!(url = %request.url, error = %e, "background refresh failed"),
            }
        })
    }
}

impl fmt::Debug for StrategyExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
