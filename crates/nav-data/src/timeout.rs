//! Timeouts for remote fetches.

use std::time::Duration;

use async_trait::async_trait;
use nav_core::{Request, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::transport::{Transport, TransportError};

/// Timeout configuration for a fetch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Total operation timeout in milliseconds.
    pub total_ms: u64,
}

impl TimeoutConfig {
    /// Create from a total timeout.
    pub fn from_total(total: Duration) -> Self {
        Self {
            total_ms: total.as_millis() as u64,
        }
    }

    /// The total timeout.
    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { total_ms: 10_000 }
    }
}

/// Error when a timeout is exceeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Total timeout after {0:?}")]
    Total(Duration),
}

/// Wraps a transport in a total timeout.
///
/// Expiry surfaces as [`TransportError::Timeout`], so it takes part in the
/// same cache fallback as any other transport failure.
#[derive(Debug, Clone)]
pub struct TimeoutTransport<T> {
    inner: T,
    config: TimeoutConfig,
}

impl<T> TimeoutTransport<T> {
    pub fn new(inner: T, config: TimeoutConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for TimeoutTransport<T> {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        let total = self.config.total();
        let url = request.url.to_string();
        match tokio::time::timeout(total, self.inner.fetch(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %url, timeout_ms = self.config.total_ms, "transport timed out");
                Err(TimeoutError::Total(total).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_core::{RequestInit, StatusCode};

    struct Slow(Duration);

    #[async_trait]
    impl Transport for Slow {
        async fn fetch(&self, _request: Request) -> Result<Response, TransportError> {
            tokio::time::sleep(self.0).await;
            Ok(Response::ok("late"))
        }
    }

    fn request() -> Request {
        RequestInit::new("https://example.com/").materialize().unwrap()
    }

    #[test]
    fn test_config_from_total() {
        let config = TimeoutConfig::from_total(Duration::from_secs(2));
        assert_eq!(config.total_ms, 2000);
        assert_eq!(config.total(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_transport_passes_through() {
        let transport = TimeoutTransport::new(
            Slow(Duration::from_millis(10)),
            TimeoutConfig::from_total(Duration::from_secs(1)),
        );
        let response = transport.fetch(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_times_out() {
        let transport = TimeoutTransport::new(
            Slow(Duration::from_secs(5)),
            TimeoutConfig::from_total(Duration::from_millis(100)),
        );
        let err = transport.fetch(request()).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            TransportError::Timeout(TimeoutError::Total(d)) if d == Duration::from_millis(100)
        ));
    }
}
