//! Observability for the navigation dispatch engine.
//!
//! This crate provides:
//! - `init_logging` - Global `tracing` subscriber with env filter and JSON/compact output
//! - `LoggingConfig` - Level and format settings
//! - `DispatchMetrics` - Atomic counters for strategies, cache, retries and relay traffic

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
