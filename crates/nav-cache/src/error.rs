//! Cache error types.

use nav_core::CoreError;
use nav_data::TransportError;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache and strategy errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// No pattern list matched and no default strategy is configured.
    #[error("no fetching strategy for {0}")]
    NoStrategy(String),

    /// A strategy name that is not one of the four strategies.
    #[error("unknown fetching strategy {0:?}")]
    UnknownStrategy(String),

    /// The request configuration is invalid.
    #[error("invalid request config: {0}")]
    InvalidConfig(String),

    /// The cache store rejected an operation.
    #[error("cache store error: {0}")]
    Store(String),

    /// The transport failed and no cached copy could stand in.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A body could not be buffered.
    #[error(transparent)]
    Body(#[from] CoreError),
}
