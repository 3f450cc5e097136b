//! Registry of article URLs the content endpoint may fetch.

use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use super::config::FRESHNESS_WINDOW;
use super::error::CacheError;
use super::kv::{KeySpace, KvKey, KvStore};
use super::metrics::METRIC_ALLOWLIST_DENIED_TOTAL;
use super::record::{AllowlistEntry, decode_allowlist, encode_allowlist};

/// Per-feed sets of original article URLs, unioned for lookups.
pub struct AllowlistRegistry {
    kv: Arc<dyn KvStore>,
}

impl AllowlistRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Overwrite the allowlist of `feed_key`; URLs from the previous rewrite are dropped.
    pub async fn replace(&self, feed_key: &str, urls: BTreeSet<String>) -> Result<(), CacheError> {
        let key = KvKey::allowlist(feed_key);
        let entry = AllowlistEntry {
            feed_key: feed_key.to_string(),
            urls,
            created_at: OffsetDateTime::now_utc(),
        };
        let encoded =
            encode_allowlist(&entry).map_err(|err| CacheError::corrupt(&key, err.to_string()))?;
        self.kv
            .set(&key, encoded)
            .await
            .map_err(|err| CacheError::backend("allowlist.replace", &key, err))?;
        debug!(feed = feed_key, urls = entry.urls.len(), "allowlist replaced");
        Ok(())
    }

    /// True when some fresh allowlist contains `url` verbatim.
    ///
    /// Expired entries seen during the scan are deleted once the scan is done.
    pub async fn is_allowed(&self, url: &str) -> Result<bool, CacheError> {
        let now = OffsetDateTime::now_utc();
        let entries = self
            .kv
            .list(KeySpace::Allowlist)
            .await
            .map_err(|err| {
                CacheError::backend_space("allowlist.scan", KeySpace::Allowlist.prefix(), err)
            })?;

        let mut expired = Vec::new();
        let mut allowed = false;
        for (key, raw) in entries {
            let entry = decode_allowlist(&key, &raw)?;
            if entry.is_expired(now, FRESHNESS_WINDOW) {
                expired.push(key);
                continue;
            }
            if entry.urls.contains(url) {
                allowed = true;
                break;
            }
        }

        for key in &expired {
            self.kv
                .delete(key)
                .await
                .map_err(|err| CacheError::backend("allowlist.expire", key, err))?;
        }

        if !allowed {
            counter!(METRIC_ALLOWLIST_DENIED_TOTAL).increment(1);
        }
        Ok(allowed)
    }

    /// Number of stored allowlists, fresh or not yet swept.
    pub async fn len(&self) -> Result<usize, CacheError> {
        self.kv
            .list(KeySpace::Allowlist)
            .await
            .map(|entries| entries.len())
            .map_err(|err| {
                CacheError::backend_space("allowlist.len", KeySpace::Allowlist.prefix(), err)
            })
    }
}
