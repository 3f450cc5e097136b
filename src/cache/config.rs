//! Cache configuration.
//!
//! Size bounds and sweep cadence of the feed cache, derived from the resolved
//! `CacheSettings`.

use std::time::Duration;

use crate::config::{
    CacheSettings, DEFAULT_CACHE_CLEANUP_INTERVAL_SECS, DEFAULT_CACHE_MAX_ENTRY_BYTES,
    DEFAULT_CACHE_MAX_TOTAL_BYTES, DEFAULT_CACHE_MEMORY_WARNING_RATIO,
};

/// Entries older than this are treated as absent by both the feed cache and the allowlist.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Fraction of `max_total_bytes` that an LRU eviction pass frees up.
pub const EVICTION_FREE_RATIO: f64 = 0.2;

/// Runtime view of [`CacheSettings`] used by the feed cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the summed size of all cached feed bodies.
    pub max_total_bytes: u64,
    /// Bodies larger than this are never cached.
    pub max_entry_bytes: u64,
    /// Minimum time between two expiry sweeps.
    pub cleanup_interval_secs: u64,
    /// Usage ratio above which a memory-pressure warning is logged.
    pub memory_warning_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_CACHE_MAX_TOTAL_BYTES,
            max_entry_bytes: DEFAULT_CACHE_MAX_ENTRY_BYTES,
            cleanup_interval_secs: DEFAULT_CACHE_CLEANUP_INTERVAL_SECS,
            memory_warning_ratio: DEFAULT_CACHE_MEMORY_WARNING_RATIO,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_total_bytes: settings.max_total_bytes.get(),
            max_entry_bytes: settings.max_entry_bytes.get(),
            cleanup_interval_secs: settings.cleanup_interval.as_secs(),
            memory_warning_ratio: settings.memory_warning_ratio,
        }
    }
}

impl CacheConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Bytes an eviction pass must leave free, given the size of the incoming entry.
    pub fn eviction_free_target(&self, incoming: u64) -> u64 {
        let ratio_target = (self.max_total_bytes as f64 * EVICTION_FREE_RATIO).ceil() as u64;
        ratio_target.max(incoming)
    }

    /// Fraction of `max_total_bytes` currently occupied.
    pub fn usage_ratio(&self, total_bytes: u64) -> f64 {
        if self.max_total_bytes == 0 {
            return 0.0;
        }
        total_bytes as f64 / self.max_total_bytes as f64
    }
}
