//! Public SDK for the navigation dispatch engine.
//!
//! This crate re-exports all engine functionality:
//!
//! ```ignore
//! use nav_sdk::prelude::*;
//!
//! init_logging(&config.logging)?;
//! let navigator = Navigator::builder(config)
//!     .with_transport(Arc::new(transport))
//!     .with_storage(Arc::new(SessionArena::<MySession>::new()))
//!     .build()?;
//!
//! navigator.install().await?;
//! let outcome = navigator
//!     .navigate(RequestInit::new(url), NavigationDetail::startup())
//!     .await?;
//! ```

pub use nav_cache;
pub use nav_core;
pub use nav_data;
pub use nav_dispatch;
pub use nav_observability;
pub use nav_relay;

/// Prelude for convenient imports.
pub mod prelude {
    pub use nav_cache::*;
    pub use nav_core::*;
    pub use nav_data::*;
    pub use nav_dispatch::*;
    pub use nav_observability::*;
    pub use nav_relay::*;
}
