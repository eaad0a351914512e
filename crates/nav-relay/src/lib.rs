//! Background messaging relay.
//!
//! After the first response of a navigation is sent, further responses and
//! requests travel over the navigation's [`ClientPort`].
//!
//! This crate provides:
//! - `ClientPort` - Ordered message port with a reply sub-port registry
//! - `LateMessages` - The receiving side, as a cancelable stream
//! - `PortMessage` / `ReplyReceiver` - Messages and their reply channels
//! - `MessageEnvelope` - JSON framing for socket-based ports

mod envelope;
mod error;
mod message;
mod port;

pub use envelope::*;
pub use error::*;
pub use message::*;
pub use port::*;
