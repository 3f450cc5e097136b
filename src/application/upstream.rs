//! Outbound fetch port used by the feed and content flows.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

/// A fetched remote resource. Non-2xx statuses are returned as data.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to `{url}` failed: {message}")]
    Network { url: String, message: String },
    #[error("request to `{url}` timed out")]
    Timeout { url: String },
    #[error("`{url}` answered with status {status}")]
    Status { url: String, status: u16 },
}

impl UpstreamError {
    pub fn network(url: &Url, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn status(url: &Url, status: u16) -> Self {
        Self::Status {
            url: url.to_string(),
            status,
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError>;
}

/// Parse a user-supplied target URL; only absolute `http`/`https` URLs are accepted.
pub fn parse_target_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_target_url("https://example.com/feed.xml").is_some());
        assert!(parse_target_url("http://example.com:8080/rss?x=1").is_some());
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(parse_target_url("ftp://example.com/feed").is_none());
        assert!(parse_target_url("file:///etc/passwd").is_none());
        assert!(parse_target_url("not a url").is_none());
        assert!(parse_target_url("/relative/path").is_none());
        assert!(parse_target_url("").is_none());
    }

    #[test]
    fn success_range_is_2xx() {
        let response = |status| UpstreamResponse {
            status,
            content_type: None,
            body: Bytes::new(),
        };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(304).is_success());
        assert!(!response(404).is_success());
        assert!(!response(500).is_success());
    }
}
