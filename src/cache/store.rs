//! Feed cache storage.
//!
//! Rewritten feed bodies live in the `rss` key space of the substrate. Reads
//! fail closed on stale entries, writes are bounded by entry and total size,
//! and an LRU pass frees space when a write would overflow the total bound.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::util::bytes::ByteSize;

use super::config::{CacheConfig, FRESHNESS_WINDOW};
use super::error::CacheError;
use super::kv::{KeySpace, KvKey, KvStore};
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::record::{
    CachedEntry, decode_allowlist, decode_entry, decode_header, encode_entry, is_expired,
};

const SOURCE: &str = "cache::store";

/// Aggregate view of the feed cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_bytes: u64,
    pub entry_count: usize,
    pub oldest_timestamp: Option<OffsetDateTime>,
    pub metrics: MetricsSnapshot,
    pub usage_ratio: f64,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub feeds_removed: usize,
    pub allowlists_removed: usize,
    pub bytes_freed: u64,
}

/// Bookkeeping for one stored feed, read without the body.
struct EntryMeta {
    key: KvKey,
    size_bytes: u64,
    created_at: OffsetDateTime,
    last_accessed_at: OffsetDateTime,
}

/// TTL, size and LRU bounded cache of rewritten feed bodies.
pub struct FeedCache {
    kv: Arc<dyn KvStore>,
    config: CacheConfig,
    metrics: Arc<CacheMetrics>,
    /// Unix milliseconds of the latest sweep, or of construction.
    last_sweep_ms: AtomicI64,
}

impl FeedCache {
    pub fn new(kv: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self {
            kv,
            config,
            metrics: Arc::new(CacheMetrics::new()),
            last_sweep_ms: AtomicI64::new(unix_millis(OffsetDateTime::now_utc())),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Look up a fresh entry, refreshing its access time.
    ///
    /// A stale entry is deleted and reported as a miss.
    #[instrument(skip(self), fields(feed = %key))]
    pub async fn get(&self, key: &str) -> Result<Option<CachedEntry>, CacheError> {
        let kv_key = KvKey::feed(key);
        let Some(raw) = self
            .kv
            .get(&kv_key)
            .await
            .map_err(|err| CacheError::backend("get", &kv_key, err))?
        else {
            self.metrics.record_miss();
            debug!(cache = "feed", outcome = "miss", "no cached entry");
            return Ok(None);
        };

        let mut entry = decode_entry(&kv_key, &raw)?;
        let now = OffsetDateTime::now_utc();

        if entry.is_expired(now, FRESHNESS_WINDOW) {
            self.kv
                .delete(&kv_key)
                .await
                .map_err(|err| CacheError::backend("get.expire", &kv_key, err))?;
            self.metrics.record_miss();
            debug!(cache = "feed", outcome = "expired", "dropped stale entry");
            return Ok(None);
        }

        entry.last_accessed_at = now;
        let encoded = encode_entry(&entry).map_err(|err| CacheError::corrupt(&kv_key, err.to_string()))?;
        self.kv
            .set(&kv_key, encoded)
            .await
            .map_err(|err| CacheError::backend("get.touch", &kv_key, err))?;
        self.metrics.record_hit();
        debug!(cache = "feed", outcome = "hit", size_bytes = entry.size_bytes, "serving cached entry");

        Ok(Some(entry))
    }

    /// Store a rewritten body.
    ///
    /// Returns `Ok(None)` when the body exceeds the single-entry limit and was not stored.
    #[instrument(skip(self, body), fields(feed = %key, size_bytes = body.len()))]
    pub async fn put(&self, key: &str, body: Bytes) -> Result<Option<CachedEntry>, CacheError> {
        let size = body.len() as u64;
        if size > self.config.max_entry_bytes {
            self.metrics.record_rejection();
            warn!(
                target = SOURCE,
                feed = key,
                size = %ByteSize(size),
                max = %ByteSize(self.config.max_entry_bytes),
                "Entry exceeds maximum cacheable size; not cached"
            );
            return Ok(None);
        }

        let current = self.total_bytes().await?;
        if current + size > self.config.max_total_bytes {
            let target = self.config.eviction_free_target(size);
            self.evict_lru(current, target).await?;
        }

        let kv_key = KvKey::feed(key);
        let entry = CachedEntry::new(key, body, OffsetDateTime::now_utc());
        let encoded = encode_entry(&entry).map_err(|err| CacheError::corrupt(&kv_key, err.to_string()))?;
        self.kv
            .set(&kv_key, encoded)
            .await
            .map_err(|err| CacheError::backend("put", &kv_key, err))?;

        self.maybe_sweep().await?;
        self.check_memory_usage().await?;

        Ok(Some(entry))
    }

    /// Remove a feed from the cache regardless of age.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let kv_key = KvKey::feed(key);
        self.kv
            .delete(&kv_key)
            .await
            .map_err(|err| CacheError::backend("invalidate", &kv_key, err))
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.list_meta().await?;
        let total_bytes = entries.iter().map(|meta| meta.size_bytes).sum();
        let oldest_timestamp = entries.iter().map(|meta| meta.created_at).min();

        Ok(CacheStats {
            total_bytes,
            entry_count: entries.len(),
            oldest_timestamp,
            metrics: self.metrics.snapshot(),
            usage_ratio: self.config.usage_ratio(total_bytes),
        })
    }

    /// Delete every expired feed and allowlist record.
    ///
    /// The two key spaces are listed and swept one after the other.
    pub async fn sweep(&self) -> Result<SweepReport, CacheError> {
        info!(target = SOURCE, "Starting cache sweep");
        let started = Instant::now();
        let now = OffsetDateTime::now_utc();
        let mut report = SweepReport::default();

        for meta in self.list_meta().await? {
            if is_expired(meta.created_at, now, FRESHNESS_WINDOW) {
                self.kv
                    .delete(&meta.key)
                    .await
                    .map_err(|err| CacheError::backend("sweep.feed", &meta.key, err))?;
                report.feeds_removed += 1;
                report.bytes_freed += meta.size_bytes;
            }
        }

        let allowlists = self
            .kv
            .list(KeySpace::Allowlist)
            .await
            .map_err(|err| CacheError::backend_space("sweep.list", KeySpace::Allowlist.prefix(), err))?;
        for (key, raw) in allowlists {
            let entry = decode_allowlist(&key, &raw)?;
            if entry.is_expired(now, FRESHNESS_WINDOW) {
                self.kv
                    .delete(&key)
                    .await
                    .map_err(|err| CacheError::backend("sweep.allowlist", &key, err))?;
                report.allowlists_removed += 1;
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_sweep(elapsed);
        let snapshot = self.metrics.snapshot();
        info!(
            target = SOURCE,
            elapsed_ms = elapsed.as_millis() as u64,
            feeds_removed = report.feeds_removed,
            allowlists_removed = report.allowlists_removed,
            freed = %ByteSize(report.bytes_freed),
            hit_rate = snapshot.hit_rate(),
            "Cache sweep completed"
        );

        Ok(report)
    }

    /// Run a sweep if the configured interval has elapsed since the last one.
    async fn maybe_sweep(&self) -> Result<(), CacheError> {
        let now = unix_millis(OffsetDateTime::now_utc());
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        let interval = i64::try_from(self.config.cleanup_interval().as_millis()).unwrap_or(i64::MAX);
        if now.saturating_sub(last) < interval {
            return Ok(());
        }
        // Claim the slot before sweeping so concurrent writers skip it.
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        self.sweep().await.map(|_| ())
    }

    async fn check_memory_usage(&self) -> Result<(), CacheError> {
        let total = self.total_bytes().await?;
        self.metrics.record_total_bytes(total);
        let ratio = self.config.usage_ratio(total);
        if ratio > self.config.memory_warning_ratio {
            warn!(
                target = SOURCE,
                usage_percent = format!("{:.2}", ratio * 100.0),
                current = %ByteSize(total),
                max = %ByteSize(self.config.max_total_bytes),
                "High cache memory usage"
            );
        }
        Ok(())
    }

    /// Delete least-recently-accessed entries until `target_free` bytes are free.
    ///
    /// Works on a snapshot; entries removed concurrently are deleted again harmlessly.
    async fn evict_lru(&self, current_total: u64, target_free: u64) -> Result<(), CacheError> {
        let mut entries = self.list_meta().await?;
        entries.sort_by(|a, b| a.last_accessed_at.cmp(&b.last_accessed_at));

        let max = self.config.max_total_bytes;
        let mut remaining = current_total;
        let mut evicted = 0u64;
        for meta in entries {
            if max.saturating_sub(remaining) >= target_free {
                break;
            }
            self.kv
                .delete(&meta.key)
                .await
                .map_err(|err| CacheError::backend("evict", &meta.key, err))?;
            remaining = remaining.saturating_sub(meta.size_bytes);
            evicted += 1;
            debug!(cache = "feed", evicted = %meta.key, size_bytes = meta.size_bytes, "evicted entry");
        }

        self.metrics.record_evictions(evicted);
        info!(
            target = SOURCE,
            evicted,
            freed = %ByteSize(current_total.saturating_sub(remaining)),
            "LRU eviction completed"
        );
        Ok(())
    }

    async fn total_bytes(&self) -> Result<u64, CacheError> {
        Ok(self
            .list_meta()
            .await?
            .iter()
            .map(|meta| meta.size_bytes)
            .sum())
    }

    async fn list_meta(&self) -> Result<Vec<EntryMeta>, CacheError> {
        let raw = self
            .kv
            .list(KeySpace::Feed)
            .await
            .map_err(|err| CacheError::backend_space("list", KeySpace::Feed.prefix(), err))?;

        raw.into_iter()
            .map(|(key, value)| {
                let (header, _) = decode_header(&key, &value)?;
                Ok(EntryMeta {
                    size_bytes: header.size_bytes,
                    created_at: header.created_at(),
                    last_accessed_at: header.last_accessed_at(),
                    key,
                })
            })
            .collect()
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
