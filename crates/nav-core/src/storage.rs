//! Storage handles attached to a request event.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::response::Response;

/// Errors raised while committing storage into a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage commit failed: {0}")]
    Commit(String),
}

/// An externally owned key/value store (cookies, session, local).
///
/// The engine only ever commits it into the final response.
#[async_trait]
pub trait StorageHandle: Send + Sync {
    /// Write pending changes into the response. No-op if nothing changed.
    async fn commit(&self, response: &mut Response) -> Result<(), StorageError>;

    /// Record that the store was written while handling the request.
    fn mark_changed(&self) {}
}

/// The storage handles for one request event.
#[derive(Clone, Default)]
pub struct StorageSet {
    pub cookies: Option<Arc<dyn StorageHandle>>,
    pub session: Option<Arc<dyn StorageHandle>>,
    pub local: Option<Arc<dyn StorageHandle>>,
}

impl StorageSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies(mut self, handle: Arc<dyn StorageHandle>) -> Self {
        self.cookies = Some(handle);
        self
    }

    pub fn with_session(mut self, handle: Arc<dyn StorageHandle>) -> Self {
        self.session = Some(handle);
        self
    }

    pub fn with_local(mut self, handle: Arc<dyn StorageHandle>) -> Self {
        self.local = Some(handle);
        self
    }

    /// Whether no handle is attached.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_none() && self.session.is_none() && self.local.is_none()
    }

    /// Commit every attached handle in cookies, session, local order.
    pub async fn commit_all(&self, response: &mut Response) -> Result<(), StorageError> {
        for handle in [&self.cookies, &self.session, &self.local].into_iter().flatten() {
            handle.commit(response).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for StorageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSet")
            .field("cookies", &self.cookies.is_some())
            .field("session", &self.session.is_some())
            .field("local", &self.local.is_some())
            .finish()
    }
}
