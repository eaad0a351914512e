//! Relay error types.

/// Errors raised by the background messaging relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// A reply was attempted on a message with several reply ports.
    #[error("message {event_id} has {num_ports} reply ports; pick one explicitly")]
    AmbiguousReplyTarget { event_id: String, num_ports: usize },

    /// The port was closed.
    #[error("port {0} is closed")]
    PortClosed(String),

    /// The addressed reply port does not exist or was closed.
    #[error("no reply port {0}")]
    NoReplyPort(String),

    /// A wire frame could not be decoded or encoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}
