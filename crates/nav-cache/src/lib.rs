//! Caching strategies for delegated fetches.
//!
//! This crate provides:
//! - `FetchingStrategy` - `cache-only`, `network-only`, `cache-first`, `network-first`
//! - `RequestConfig` - Pattern lists and default strategy
//! - `select_strategy` - Priority-ordered strategy selection
//! - `UrlMatcher` / `PathTemplateMatcher` - URL pattern matching
//! - `CacheStore` / `CachePartition` - The two-tier (content + JSON) cache contract
//! - `StrategyExecutor` - The four executors, precache and partition cleanup
//!
//! # Example
//!
//! ```ignore
//! use nav_cache::{RequestConfig, FetchingStrategy};
//!
//! let config = RequestConfig::new()
//!     .with_cache_only(["/static/*"])
//!     .with_network_first(["/api/*"])
//!     .with_default_strategy(FetchingStrategy::CacheFirst);
//! ```

mod config;
mod error;
mod executor;
mod pattern;
mod precache;
mod refresh;
mod selector;
mod store;
mod strategy;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use pattern::*;
pub use refresh::*;
pub use selector::*;
pub use store::*;
pub use strategy::*;
