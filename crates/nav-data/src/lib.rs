//! Remote data access for the navigation dispatch engine.
//!
//! This crate provides:
//! - `Transport` - The remote transport contract
//! - `TimeoutTransport` - Total timeouts around any transport
//! - `RetryPolicy` / `RetryState` / `RetryToken` - Retry-After polling limits and cancellation
//! - `Sleeper` - Injectable timed waits (`TokioSleeper`, `RecordingSleeper`)

mod clock;
mod retry;
mod timeout;
mod transport;

pub use clock::*;
pub use retry::*;
pub use timeout::*;
pub use transport::*;
