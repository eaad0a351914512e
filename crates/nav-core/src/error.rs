//! Core error types.

/// Errors raised while building or reading requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Malformed construction input (missing URL or method, bad header).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The body stream was already read once.
    #[error("body has already been consumed")]
    BodyConsumed,

    /// The underlying body stream yielded an error.
    #[error("body stream failed: {0}")]
    BodyStream(String),

    /// The body could not be decoded into the requested shape.
    #[error("failed to decode body: {0}")]
    Decode(String),
}

impl CoreError {
    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
