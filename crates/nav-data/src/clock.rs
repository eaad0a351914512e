//! Injectable sleep primitive for timed waits.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

/// Suspends the caller for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

type WaitHook = Box<dyn Fn(usize, Duration) + Send + Sync>;

/// Records requested waits without sleeping.
///
/// The optional hook runs with the zero-based wait index, in place of the
/// elapsed timer.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
    hook: Option<WaitHook>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` during every wait.
    pub fn with_hook(hook: impl Fn(usize, Duration) + Send + Sync + 'static) -> Self {
        Self {
            waits: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    /// Every wait requested so far.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn wait_count(&self) -> usize {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let index = {
            let mut waits = self.waits.lock().unwrap_or_else(PoisonError::into_inner);
            waits.push(duration);
            waits.len() - 1
        };
        if let Some(hook) = &self.hook {
            hook(index, duration);
        }
        tokio::task::yield_now().await;
    }
}
