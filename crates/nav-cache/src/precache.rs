//! Install-time precaching and activate-time partition cleanup.

use nav_core::Request;
use tracing::info;
use url::Url;

use crate::error::CacheError;
use crate::executor::StrategyExecutor;

impl StrategyExecutor {
    /// Fetch every non-pattern URL of the cache-first and cache-only lists
    /// into the default partition. Returns the number of entries written.
    ///
    /// Any transport failure or non-success status aborts the install.
    pub async fn precache(&self, origin: &Url) -> Result<usize, CacheError> {
        let urls = self.config().precache_urls(origin, self.matcher().as_ref());
        if urls.is_empty() {
            return Ok(0);
        }

        info!(count = urls.len(), cache = %self.config().cache_name, "pre-caching resources");
        let partition = self.store().open_partition(&self.config().cache_name).await?;
        for url in &urls {
            let request = Request::get(url.clone());
            let response = self.transport().fetch(request.clone()).await?;
            if !response.is_success() {
                return Err(CacheError::Store(format!(
                    "precache of {url} returned {}",
                    response.status
                )));
            }
            partition.put(&request, response).await?;
            self.metrics().record_cache_write();
        }
        Ok(urls.len())
    }

    /// Delete every partition other than the default and JSON partitions.
    /// Returns the deleted names.
    pub async fn purge_stale_partitions(&self) -> Result<Vec<String>, CacheError> {
        let keep = [self.config().cache_name.clone(), self.config().json_cache_name()];
        let mut removed = Vec::new();
        for name in self.store().keys().await? {
            if keep.contains(&name) {
                continue;
            }
            info!(cache = %name, "removing old cache");
            if self.store().delete(&name).await? {
                removed.push(name);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::pattern::PathTemplateMatcher;
    use crate::store::{CacheStore, InMemoryCacheStore};
    use async_trait::async_trait;
    use http::StatusCode;
    use nav_core::Response;
    use nav_data::{Transport, TransportError};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct PathTransport {
        seen: Mutex<Vec<String>>,
        missing: Option<&'static str>,
    }

    #[async_trait]
    impl Transport for PathTransport {
        async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
            let path = request.url.path().to_string();
            self.seen.lock().unwrap().push(path.clone());
            if Some(path.as_str()) == self.missing {
                return Ok(Response::not_found());
            }
            Ok(Response::ok(path))
        }
    }

    fn origin() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    fn build(
        config: RequestConfig,
        transport: Arc<PathTransport>,
    ) -> (StrategyExecutor, InMemoryCacheStore) {
        let store = InMemoryCacheStore::new();
        let executor = StrategyExecutor::new(
            Arc::new(store.clone()),
            transport,
            config,
            Arc::new(PathTemplateMatcher::new(origin())),
        );
        (executor, store)
    }

    #[tokio::test]
    async fn test_precache_fetches_literal_urls() {
        let transport = Arc::new(PathTransport::default());
        let config = RequestConfig::new()
            .with_cache_first(["/index.html", "/assets/*"])
            .with_cache_only(["/static/app.js"]);
        let (executor, store) = build(config, transport.clone());

        assert_eq!(executor.precache(&origin()).await.unwrap(), 2);
        assert_eq!(
            *transport.seen.lock().unwrap(),
            vec!["/index.html".to_string(), "/static/app.js".to_string()]
        );
        assert_eq!(store.entry_count("webflo").await, 2);
    }

    #[tokio::test]
    async fn test_precache_nothing_to_do() {
        let transport = Arc::new(PathTransport::default());
        let config = RequestConfig::new().with_cache_first(["/assets/*"]);
        let (executor, store) = build(config, transport);
        assert_eq!(executor.precache(&origin()).await.unwrap(), 0);
        assert!(store.opened_partitions().is_empty());
    }

    #[tokio::test]
    async fn test_precache_fails_on_error_status() {
        let transport = Arc::new(PathTransport {
            missing: Some("/gone.js"),
            ..Default::default()
        });
        let config = RequestConfig::new().with_cache_only(["/gone.js"]);
        let (executor, _) = build(config, transport);
        let err = executor.precache(&origin()).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(msg) if msg.contains(&StatusCode::NOT_FOUND.to_string())));
    }

    #[tokio::test]
    async fn test_purge_keeps_current_partitions() {
        let transport = Arc::new(PathTransport::default());
        let config = RequestConfig::new().with_cache_name("v2");
        let (executor, store) = build(config, transport);
        for name in ["v1", "v1_json", "v2", "v2_json"] {
            store.open_partition(name).await.unwrap();
        }

        let removed = executor.purge_stale_partitions().await.unwrap();
        assert_eq!(removed, vec!["v1", "v1_json"]);
        assert_eq!(store.keys().await.unwrap(), vec!["v2", "v2_json"]);
    }
}
