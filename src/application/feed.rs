use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::rewrite::LinkRewriter;
use crate::application::upstream::{Upstream, UpstreamError, parse_target_url};
use crate::cache::{AllowlistRegistry, CacheError, CachedEntry, FeedCache};
use crate::domain::error::DocumentError;
use crate::infra::rss::parse_document;

const SOURCE: &str = "application::feed";

/// Whether a feed body came from the cache or was fetched for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Hit,
    Miss,
}

impl FeedSource {
    pub fn as_header_value(self) -> &'static str {
        match self {
            FeedSource::Hit => "HIT",
            FeedSource::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedOutcome {
    pub entry: CachedEntry,
    pub source: FeedSource,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed url `{0}`")]
    InvalidUrl(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Serves rewritten feeds, fetching and rewriting on a cache miss.
#[derive(Clone)]
pub struct FeedService {
    cache: Arc<FeedCache>,
    allowlist: Arc<AllowlistRegistry>,
    upstream: Arc<dyn Upstream>,
    rewriter: LinkRewriter,
}

impl FeedService {
    pub fn new(
        cache: Arc<FeedCache>,
        allowlist: Arc<AllowlistRegistry>,
        upstream: Arc<dyn Upstream>,
        rewriter: LinkRewriter,
    ) -> Self {
        Self {
            cache,
            allowlist,
            upstream,
            rewriter,
        }
    }

    /// Cached rewritten feed for `feed_url`, fetched and rewritten on a miss.
    pub async fn load(&self, feed_url: &str) -> Result<FeedOutcome, FeedError> {
        let target =
            parse_target_url(feed_url).ok_or_else(|| FeedError::InvalidUrl(feed_url.to_string()))?;

        if let Some(entry) = self.cache.get(feed_url).await? {
            return Ok(FeedOutcome {
                entry,
                source: FeedSource::Hit,
            });
        }

        let started = Instant::now();
        let response = self.upstream.fetch(&target).await?;
        if !response.is_success() {
            return Err(UpstreamError::status(&target, response.status).into());
        }

        let document = parse_document(&String::from_utf8_lossy(&response.body))?;
        let rewritten = self.rewriter.rewrite(&document);
        let body = Bytes::from(rewritten.document.to_xml());
        let link_count = rewritten.original_urls.len();

        self.allowlist
            .replace(feed_url, rewritten.original_urls)
            .await?;
        let entry = match self.cache.put(feed_url, body.clone()).await? {
            Some(entry) => entry,
            None => {
                warn!(
                    target = SOURCE,
                    feed = feed_url,
                    "Serving rewritten feed without caching it"
                );
                CachedEntry::new(feed_url, body, OffsetDateTime::now_utc())
            }
        };

        info!(
            target = SOURCE,
            feed = feed_url,
            links = link_count,
            size_bytes = entry.size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched and rewrote feed"
        );

        Ok(FeedOutcome {
            entry,
            source: FeedSource::Miss,
        })
    }
}
