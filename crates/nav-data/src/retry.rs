//! Retry-After polling policy and its cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cooperative cancellation token for one dispatch chain.
///
/// Clones share state, so a nested retry reuses its parent's token.
#[derive(Debug, Clone, Default)]
pub struct RetryToken {
    aborted: Arc<AtomicBool>,
}

impl RetryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the token. Idempotent.
    pub fn cancel(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same token.
    pub fn same_as(&self, other: &RetryToken) -> bool {
        Arc::ptr_eq(&self.aborted, &other.aborted)
    }
}

/// Limits on the Retry-After loop. Both limits are unbounded by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry waits per dispatch chain.
    pub max_attempts: Option<u32>,
    /// Upper bound on a single wait, in seconds.
    pub max_delay_secs: Option<u64>,
}

impl RetryPolicy {
    /// A policy with no limits.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_max_delay_secs(mut self, secs: u64) -> Self {
        self.max_delay_secs = Some(secs);
        self
    }

    /// Whether another wait is allowed after `attempts` completed waits.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    /// The wait for a `Retry-After` value, clamped to `max_delay_secs`.
    pub fn delay_for(&self, retry_after_secs: u64) -> Duration {
        let secs = match self.max_delay_secs {
            Some(max) => retry_after_secs.min(max),
            None => retry_after_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Live Retry-After state for one dispatch chain.
#[derive(Debug, Clone)]
pub struct RetryState {
    token: RetryToken,
    attempts: u32,
}

impl RetryState {
    /// Start polling with a fresh token.
    pub fn new() -> Self {
        Self::with_token(RetryToken::new())
    }

    /// Start polling with an existing token.
    pub fn with_token(token: RetryToken) -> Self {
        Self { token, attempts: 0 }
    }

    pub fn token(&self) -> &RetryToken {
        &self.token
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_aborted()
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}
