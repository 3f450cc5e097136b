//! Process-wide cache counters.
//!
//! Counters are mirrored to the `metrics` facade so an installed recorder sees
//! them too; the in-process copy backs the stats endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge, histogram};

pub const METRIC_CACHE_HIT_TOTAL: &str = "feedgate_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "feedgate_cache_miss_total";
pub const METRIC_CACHE_EVICT_TOTAL: &str = "feedgate_cache_evict_total";
pub const METRIC_CACHE_REJECT_TOTAL: &str = "feedgate_cache_reject_total";
pub const METRIC_CACHE_SWEEP_TOTAL: &str = "feedgate_cache_sweep_total";
pub const METRIC_CACHE_SWEEP_MS: &str = "feedgate_cache_sweep_ms";
pub const METRIC_CACHE_BYTES: &str = "feedgate_cache_bytes";
pub const METRIC_ALLOWLIST_DENIED_TOTAL: &str = "feedgate_allowlist_denied_total";
pub const METRIC_COMPRESSION_FALLBACK_TOTAL: &str = "feedgate_compression_fallback_total";

/// Monotonic hit/miss/sweep counters. Never reset.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    cleanups: AtomicU64,
    last_cleanup_micros: AtomicU64,
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub cleanups: u64,
    pub last_cleanup_duration: Duration,
}

impl MetricsSnapshot {
    /// hits / (hits + misses), or 0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
    }

    pub(crate) fn record_sweep(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.last_cleanup_micros.store(micros, Ordering::Relaxed);
        self.cleanups.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_SWEEP_TOTAL).increment(1);
        histogram!(METRIC_CACHE_SWEEP_MS).record(duration.as_secs_f64() * 1000.0);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        if count > 0 {
            counter!(METRIC_CACHE_EVICT_TOTAL).increment(count);
        }
    }

    pub(crate) fn record_rejection(&self) {
        counter!(METRIC_CACHE_REJECT_TOTAL).increment(1);
    }

    pub(crate) fn record_total_bytes(&self, total_bytes: u64) {
        gauge!(METRIC_CACHE_BYTES).set(total_bytes as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cleanups: self.cleanups.load(Ordering::Relaxed),
            last_cleanup_duration: Duration::from_micros(
                self.last_cleanup_micros.load(Ordering::Relaxed),
            ),
        }
    }
}
