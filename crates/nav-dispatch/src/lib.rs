//! Request dispatch for the navigation engine.
//!
//! This crate provides:
//! - `RequestEvent` - A request travelling through the pipeline, resolved at most once
//! - `Pipeline` / `Middleware` / `Next` - Ordered middleware composition
//! - `CrossLayerFetch` - Terminal handler delegating to the strategy executors
//! - `Dispatcher` / `ProcessState` - Redirect normalization and the Retry-After loop
//! - `Navigator` / `DispatchOutcome` - Navigations with immediate and late responses
//! - `NavigatorConfig` - TOML/JSON configuration
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nav_dispatch::{Navigator, NavigatorConfig, NavigationDetail};
//! use nav_core::RequestInit;
//!
//! let config = NavigatorConfig::load("navigator.toml")?;
//! let navigator = Navigator::builder(config)
//!     .with_transport(Arc::new(my_transport))
//!     .with_middleware(Auth::default())
//!     .build()?;
//!
//! let outcome = navigator
//!     .navigate(RequestInit::new("https://shop.example/cart"), NavigationDetail::default())
//!     .await?;
//! if let Some(mut late) = outcome.late {
//!     while let Some(message) = late.next_message().await {
//!         // render late responses
//!     }
//! }
//! ```

mod config;
mod context;
mod dispatcher;
mod error;
mod event;
mod navigator;
mod pipeline;
mod responder;

pub use config::*;
pub use context::*;
pub use dispatcher::*;
pub use error::*;
pub use event::*;
pub use navigator::*;
pub use pipeline::*;
pub use responder::{Delivery, ImmediateResponse};
