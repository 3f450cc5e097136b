//! Feedgate cache system
//!
//! Two stores share one key-value substrate under disjoint key spaces:
//!
//! - **Feed cache** (`rss/*`): rewritten feed bodies, bounded by a fixed
//!   freshness window, a per-entry size limit and a total size limit with LRU
//!   eviction.
//! - **Allowlist** (`valid_urls/*`): per-feed sets of original article URLs
//!   that the content endpoint may fetch.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_total_bytes = 52428800
//! max_entry_bytes = 52428800
//! cleanup_interval_seconds = 1800
//! memory_warning_ratio = 0.8
//! ```

mod allowlist;
mod config;
mod error;
mod kv;
mod metrics;
mod record;
mod store;

pub use allowlist::AllowlistRegistry;
pub use config::{CacheConfig, EVICTION_FREE_RATIO, FRESHNESS_WINDOW};
pub use error::CacheError;
pub use kv::{KeySpace, KvError, KvKey, KvStore, MemoryKv};
pub use metrics::{
    CacheMetrics, METRIC_ALLOWLIST_DENIED_TOTAL, METRIC_CACHE_BYTES, METRIC_CACHE_EVICT_TOTAL,
    METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_REJECT_TOTAL,
    METRIC_CACHE_SWEEP_MS, METRIC_CACHE_SWEEP_TOTAL, METRIC_COMPRESSION_FALLBACK_TOTAL,
    MetricsSnapshot,
};
pub use record::{AllowlistEntry, CachedEntry};
pub use store::{CacheStats, FeedCache, SweepReport};
