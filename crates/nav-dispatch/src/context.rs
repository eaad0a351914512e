//! Typed values shared by every handler of one dispatch.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use http::Extensions;

/// Per-dispatch context, passed unchanged to every middleware and to the
/// retry attempts of the same chain.
#[derive(Default)]
pub struct DispatchContext {
    values: Mutex<Extensions>,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(value)
    }

    pub fn with<T: Clone + Send + Sync + 'static>(self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// A copy of the stored value of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get::<T>()
            .cloned()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get::<T>()
            .is_some()
    }

    pub fn remove<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove::<T>()
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.values.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("DispatchContext").field("values", &len).finish()
    }
}
