//! Remote transport contract.

use std::sync::Arc;

use async_trait::async_trait;
use nav_core::{Request, Response};

use crate::timeout::TimeoutError;

/// Errors surfaced by a remote transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The remote could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The transport gave up waiting.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The request was rejected before it was sent.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether the error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Delegates a request to a remote origin.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a response for the request.
    async fn fetch(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        (**self).fetch(request).await
    }
}
