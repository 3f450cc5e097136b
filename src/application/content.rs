use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::upstream::{Upstream, UpstreamError, parse_target_url};
use crate::cache::{AllowlistRegistry, CacheError};

const SOURCE: &str = "application::content";
const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// An allowlisted article fetched on behalf of a client.
#[derive(Debug, Clone)]
pub struct ContentResponse {
    pub original_url: String,
    pub content_type: String,
    pub body: Bytes,
}

impl ContentResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"))
    }
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid content url `{0}`")]
    InvalidUrl(String),
    #[error("content url `{0}` is not allowlisted")]
    NotAllowed(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Proxies article fetches, restricted to URLs seen in a recently rewritten feed.
#[derive(Clone)]
pub struct ContentService {
    allowlist: Arc<AllowlistRegistry>,
    upstream: Arc<dyn Upstream>,
}

impl ContentService {
    pub fn new(allowlist: Arc<AllowlistRegistry>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            allowlist,
            upstream,
        }
    }

    pub async fn fetch(&self, content_url: &str) -> Result<ContentResponse, ContentError> {
        let target = parse_target_url(content_url)
            .ok_or_else(|| ContentError::InvalidUrl(content_url.to_string()))?;

        if !self.allowlist.is_allowed(content_url).await? {
            warn!(
                target = SOURCE,
                url = content_url,
                "Refusing content fetch for URL outside the allowlist"
            );
            return Err(ContentError::NotAllowed(content_url.to_string()));
        }

        let response = self.upstream.fetch(&target).await?;
        if !response.is_success() {
            return Err(UpstreamError::status(&target, response.status).into());
        }
        debug!(url = content_url, size_bytes = response.body.len(), "content fetched");

        Ok(ContentResponse {
            original_url: content_url.to_string(),
            content_type: response
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::application::upstream::UpstreamResponse;
    use crate::cache::MemoryKv;

    struct StubUpstream {
        status: u16,
        content_type: Option<&'static str>,
    }

    #[async_trait]
    impl Upstream for StubUpstream {
        async fn fetch(&self, _url: &Url) -> Result<UpstreamResponse, UpstreamError> {
            Ok(UpstreamResponse {
                status: self.status,
                content_type: self.content_type.map(str::to_string),
                body: Bytes::from_static(b"<html>article</html>"),
            })
        }
    }

    async fn service(status: u16, content_type: Option<&'static str>) -> ContentService {
        let allowlist = Arc::new(AllowlistRegistry::new(Arc::new(MemoryKv::new())));
        allowlist
            .replace(
                "https://example.com/feed",
                BTreeSet::from(["https://example.com/a".to_string()]),
            )
            .await
            .expect("seed allowlist");
        ContentService::new(
            allowlist,
            Arc::new(StubUpstream {
                status,
                content_type,
            }),
        )
    }

    #[tokio::test]
    async fn allowlisted_url_is_fetched_with_default_content_type() {
        let service = service(200, None).await;
        let response = service.fetch("https://example.com/a").await.expect("fetch");
        assert_eq!(response.content_type, "text/html");
        assert!(response.is_html());
        assert_eq!(response.original_url, "https://example.com/a");
    }

    #[tokio::test]
    async fn upstream_content_type_is_kept() {
        let service = service(200, Some("application/pdf")).await;
        let response = service.fetch("https://example.com/a").await.expect("fetch");
        assert_eq!(response.content_type, "application/pdf");
        assert!(!response.is_html());
    }

    #[tokio::test]
    async fn foreign_url_is_refused() {
        let service = service(200, None).await;
        let err = service
            .fetch("https://evil.example/a")
            .await
            .expect_err("not allowed");
        assert!(matches!(err, ContentError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let service = service(200, None).await;
        let err = service.fetch("javascript:alert(1)").await.expect_err("invalid");
        assert!(matches!(err, ContentError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn upstream_failure_status_is_an_error() {
        let service = service(404, None).await;
        let err = service.fetch("https://example.com/a").await.expect_err("404");
        assert!(matches!(
            err,
            ContentError::Upstream(UpstreamError::Status { status: 404, .. })
        ));
    }
}
