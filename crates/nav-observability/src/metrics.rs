//! Dispatch counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters shared by every component of a navigator.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    dispatches: AtomicU64,
    dispatch_failures: AtomicU64,
    strategy_cache_only: AtomicU64,
    strategy_network_only: AtomicU64,
    strategy_cache_first: AtomicU64,
    strategy_network_first: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_fallbacks: AtomicU64,
    cache_writes: AtomicU64,
    background_refreshes: AtomicU64,
    retry_waits: AtomicU64,
    retry_cancellations: AtomicU64,
    redirects_triggered: AtomicU64,
    background_messages: AtomicU64,
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub dispatches: u64,
    pub dispatch_failures: u64,
    pub strategy_cache_only: u64,
    pub strategy_network_only: u64,
    pub strategy_cache_first: u64,
    pub strategy_network_first: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_fallbacks: u64,
    pub cache_writes: u64,
    pub background_refreshes: u64,
    pub retry_waits: u64,
    pub retry_cancellations: u64,
    pub redirects_triggered: u64,
    pub background_messages: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        bump(&self.dispatches);
    }

    pub fn record_dispatch_failure(&self) {
        bump(&self.dispatch_failures);
    }

    /// Count a strategy selection by its kebab-case name. Unknown names are ignored.
    pub fn record_strategy(&self, strategy: &str) {
        match strategy {
            "cache-only" => bump(&self.strategy_cache_only),
            "network-only" => bump(&self.strategy_network_only),
            "cache-first" => bump(&self.strategy_cache_first),
            "network-first" => bump(&self.strategy_network_first),
            _ => {}
        }
    }

    pub fn record_cache_hit(&self) {
        bump(&self.cache_hits);
    }

    pub fn record_cache_miss(&self) {
        bump(&self.cache_misses);
    }

    pub fn record_cache_fallback(&self) {
        bump(&self.cache_fallbacks);
    }

    pub fn record_cache_write(&self) {
        bump(&self.cache_writes);
    }

    pub fn record_background_refresh(&self) {
        bump(&self.background_refreshes);
    }

    pub fn record_retry_wait(&self) {
        bump(&self.retry_waits);
    }

    pub fn record_retry_cancellation(&self) {
        bump(&self.retry_cancellations);
    }

    pub fn record_redirect(&self) {
        bump(&self.redirects_triggered);
    }

    pub fn record_background_message(&self) {
        bump(&self.background_messages);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            dispatches: load(&self.dispatches),
            dispatch_failures: load(&self.dispatch_failures),
            strategy_cache_only: load(&self.strategy_cache_only),
            strategy_network_only: load(&self.strategy_network_only),
            strategy_cache_first: load(&self.strategy_cache_first),
            strategy_network_first: load(&self.strategy_network_first),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            cache_fallbacks: load(&self.cache_fallbacks),
            cache_writes: load(&self.cache_writes),
            background_refreshes: load(&self.background_refreshes),
            retry_waits: load(&self.retry_waits),
            retry_cancellations: load(&self.retry_cancellations),
            redirects_triggered: load(&self.redirects_triggered),
            background_messages: load(&self.background_messages),
        }
    }
}

impl MetricsSnapshot {
    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Total strategy selections.
    pub fn strategies_selected(&self) -> u64 {
        self.strategy_cache_only
            + self.strategy_network_only
            + self.strategy_cache_first
            + self.strategy_network_first
    }
}
