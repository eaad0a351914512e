//! Dispatch error types.

use nav_cache::CacheError;
use nav_core::CoreError;
use nav_relay::RelayError;

/// Errors raised while dispatching a navigation.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// `resolve` was called twice on the same event.
    #[error("response already resolved for this event")]
    AlreadyResolved,

    /// The navigation's final response was already delivered.
    #[error("final response already sent")]
    FinalResponseSent,

    /// A middleware or terminal handler failed.
    #[error("dispatch failed: {0}")]
    DispatchFailed(#[from] anyhow::Error),

    /// Malformed construction input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid navigator configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A delegated fetch failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The background port rejected a message.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl From<CoreError> for DispatchError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::InvalidArgument(message) => Self::InvalidArgument(message),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl DispatchError {
    /// Whether the error came out of the middleware chain.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, Self::DispatchFailed(_))
    }
}
