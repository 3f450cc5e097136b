use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use feedgate::application::content::ContentService;
use feedgate::application::feed::FeedService;
use feedgate::application::rewrite::LinkRewriter;
use feedgate::application::upstream::{Upstream, UpstreamError, UpstreamResponse};
use feedgate::cache::{AllowlistRegistry, CacheConfig, FeedCache, KvStore, MemoryKv};
use feedgate::infra::http::{
    BodyEncoder, Compressor, Encoding, GzipEncoder, HttpState, build_router,
};

const FEED_URL: &str = "https://example.com/feed.xml";
const SMALL_FEED_URL: &str = "https://example.com/small.xml";
const BROKEN_FEED_URL: &str = "https://example.com/broken.xml";
const MISSING_FEED_URL: &str = "https://example.com/gone.xml";
const ARTICLE_URL: &str = "https://example.com/posts/1";

#[derive(Default)]
struct StubUpstream {
    responses: HashMap<String, UpstreamResponse>,
    calls: AtomicUsize,
}

impl StubUpstream {
    fn respond(mut self, url: &str, status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.responses.insert(
            url.to_string(),
            UpstreamResponse {
                status,
                content_type: Some(content_type.to_string()),
                body: body.into(),
            },
        );
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for StubUpstream {
    async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| UpstreamError::network(url, "connection refused"))
    }
}

fn sample_feed() -> String {
    let mut items = String::new();
    for index in 1..=20 {
        items.push_str(&format!(
            "<item><title>Post {index}</title><link>https://example.com/posts/{index}</link>\
             <description>Summary of post number {index} with enough words to pad the body.</description></item>\n"
        ));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\"><channel>\
         <title>Example</title><link>https://example.com/</link>\
         <description>Example feed</description>\n{items}</channel></rss>"
    )
}

fn small_feed() -> &'static str {
    "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Small</title>\
     <item><title>Only</title><link>https://example.com/posts/only</link></item>\
     </channel></rss>"
}

struct BrokenBrotli;

impl BodyEncoder for BrokenBrotli {
    fn encoding(&self) -> Encoding {
        Encoding::Brotli
    }

    fn encode(&self, _input: &[u8]) -> io::Result<Vec<u8>> {
        Err(io::Error::other("brotli disabled"))
    }
}

struct Gateway {
    router: Router,
    upstream: Arc<StubUpstream>,
}

fn gateway() -> Gateway {
    gateway_with(Compressor::default())
}

fn gateway_with(compressor: Compressor) -> Gateway {
    let upstream = Arc::new(
        StubUpstream::default()
            .respond(FEED_URL, 200, "application/rss+xml", sample_feed())
            .respond(SMALL_FEED_URL, 200, "application/rss+xml", small_feed())
            .respond(BROKEN_FEED_URL, 200, "text/html", "<html>not a feed</html>")
            .respond(MISSING_FEED_URL, 404, "text/plain", "not found")
            .respond(
                ARTICLE_URL,
                200,
                "text/html; charset=utf-8",
                "<html><body>Post 1</body></html>",
            ),
    );

    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let cache = Arc::new(FeedCache::new(kv.clone(), CacheConfig::default()));
    let allowlist = Arc::new(AllowlistRegistry::new(kv));
    let feed = Arc::new(FeedService::new(
        cache.clone(),
        allowlist.clone(),
        upstream.clone(),
        LinkRewriter::new("http://gw.local/"),
    ));
    let content = Arc::new(ContentService::new(allowlist.clone(), upstream.clone()));

    let router = build_router(HttpState {
        feed,
        content,
        cache,
        allowlist,
        compressor,
        content_csp: true,
    });
    Gateway { router, upstream }
}

fn feed_path(url: &str) -> String {
    format!("/rss/?feedURL={}", urlencoding::encode(url))
}

fn content_path(url: &str) -> String {
    format!("/content/?contentURL={}", urlencoding::encode(url))
}

async fn send(router: &Router, request: Request<Body>) -> axum::response::Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn get(router: &Router, path: &str) -> axum::response::Response {
    send(
        router,
        Request::get(path).body(Body::empty()).expect("request"),
    )
    .await
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
}

fn header_value<'a>(response: &'a axum::response::Response, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn feed_miss_then_hit_serves_identical_body() {
    let gateway = gateway();

    let first = get(&gateway.router, &feed_path(FEED_URL)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_value(&first, "x-cache"), Some("MISS"));
    assert_eq!(header_value(&first, "content-type"), Some("application/xml"));
    assert_eq!(
        header_value(&first, "cache-control"),
        Some("public, max-age=300, must-revalidate")
    );
    assert_eq!(header_value(&first, "x-frame-options"), Some("DENY"));
    assert_eq!(header_value(&first, "x-content-type-options"), Some("nosniff"));
    assert!(header_value(&first, "last-modified").is_some());
    assert!(header_value(&first, "x-cache-timestamp").is_some());
    let first_etag = header_value(&first, "etag").map(str::to_string);
    let first_body = body_bytes(first).await;

    let second = get(&gateway.router, &feed_path(FEED_URL)).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header_value(&second, "x-cache"), Some("HIT"));
    assert_eq!(header_value(&second, "etag").map(str::to_string), first_etag);
    let second_body = body_bytes(second).await;

    assert_eq!(first_body, second_body);
    assert_eq!(gateway.upstream.calls(), 1);

    let text = String::from_utf8(first_body.to_vec()).expect("utf-8 feed");
    assert!(text.contains(
        "<link>http://gw.local/content/?contentURL=https%3A%2F%2Fexample.com%2Fposts%2F1</link>"
    ));
    assert!(!text.contains("<link>https://example.com/posts/1</link>"));
}

#[tokio::test]
async fn allowlisted_content_is_proxied() {
    let gateway = gateway();
    assert_eq!(
        get(&gateway.router, &feed_path(FEED_URL)).await.status(),
        StatusCode::OK
    );

    let response = get(&gateway.router, &content_path(ARTICLE_URL)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_value(&response, "content-type"),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(header_value(&response, "x-original-url"), Some(ARTICLE_URL));
    assert_eq!(
        header_value(&response, "cache-control"),
        Some("no-store, must-revalidate")
    );
    assert!(
        header_value(&response, "content-security-policy")
            .is_some_and(|csp| csp.starts_with("default-src 'self'"))
    );
    assert_eq!(
        body_bytes(response).await,
        Bytes::from_static(b"<html><body>Post 1</body></html>")
    );
}

#[tokio::test]
async fn foreign_content_is_forbidden() {
    let gateway = gateway();
    assert_eq!(
        get(&gateway.router, &feed_path(FEED_URL)).await.status(),
        StatusCode::OK
    );

    let response = get(&gateway.router, &content_path("https://evil.example.net/")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_bytes(response).await,
        Bytes::from_static(b"URL not found in allowed list")
    );

    let trailing = get(&gateway.router, &content_path("https://example.com/posts/1/")).await;
    assert_eq!(trailing.status(), StatusCode::FORBIDDEN);
    assert_eq!(gateway.upstream.calls(), 1);
}

#[tokio::test]
async fn missing_and_invalid_parameters_are_bad_requests() {
    let gateway = gateway();

    let cases = [
        ("/rss/", "Missing feedURL parameter"),
        ("/rss/?feedURL=", "Missing feedURL parameter"),
        ("/rss/?feedURL=not-a-url", "Invalid feedURL"),
        ("/content/", "Missing contentURL parameter"),
        ("/content/?contentURL=ftp%3A%2F%2Fexample.com", "Invalid contentURL"),
    ];
    for (path, message) in cases {
        let response = get(&gateway.router, path).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(
            header_value(&response, "cache-control"),
            Some("no-store, must-revalidate")
        );
        assert_eq!(body_bytes(response).await, Bytes::from(message), "{path}");
    }
    assert_eq!(gateway.upstream.calls(), 0);
}

#[tokio::test]
async fn upstream_failures_are_bad_gateway() {
    let gateway = gateway();

    let cases = [
        (MISSING_FEED_URL, "Failed to fetch RSS feed"),
        ("https://unreachable.example.org/feed", "Failed to fetch RSS feed"),
        (BROKEN_FEED_URL, "Failed to parse RSS feed"),
    ];
    for (url, message) in cases {
        let response = get(&gateway.router, &feed_path(url)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY, "{url}");
        assert_eq!(body_bytes(response).await, Bytes::from(message), "{url}");
    }

    // Failed loads leave nothing behind to allowlist.
    let response = get(&gateway.router, &content_path("https://example.com/posts/1")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn matching_etag_on_hit_is_not_modified() {
    let gateway = gateway();

    let first = get(&gateway.router, &feed_path(FEED_URL)).await;
    let etag = header_value(&first, "etag").expect("etag").to_string();

    let conditional = |etag: &str| {
        Request::get(feed_path(FEED_URL))
            .header(header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .expect("request")
    };

    let response = send(&gateway.router, conditional(&etag)).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header_value(&response, "etag"), Some(etag.as_str()));
    assert_eq!(
        header_value(&response, "cache-control"),
        Some("public, max-age=300, must-revalidate")
    );
    assert!(body_bytes(response).await.is_empty());

    let response = send(&gateway.router, conditional("\"stale\"")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-cache"), Some("HIT"));
}

#[tokio::test]
async fn if_modified_since_on_hit_is_not_modified() {
    let gateway = gateway();

    let first = get(&gateway.router, &feed_path(FEED_URL)).await;
    let last_modified = header_value(&first, "last-modified")
        .expect("last-modified")
        .to_string();

    let response = send(
        &gateway.router,
        Request::get(feed_path(FEED_URL))
            .header(header::IF_MODIFIED_SINCE, last_modified)
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn errors_are_json_when_requested() {
    let gateway = gateway();

    let response = send(
        &gateway.router,
        Request::get("/rss/")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(body["error"], "Missing feedURL parameter");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn malformed_query_strings_use_the_error_contract() {
    let gateway = gateway();

    let cases = [
        (
            "/rss/?feedURL=https%3A%2F%2Fa.example%2Ffeed.xml&feedURL=https%3A%2F%2Fb.example%2Ffeed.xml",
            "Invalid feedURL",
        ),
        (
            "/content/?contentURL=https%3A%2F%2Fa.example%2F1&contentURL=https%3A%2F%2Fb.example%2F2",
            "Invalid contentURL",
        ),
    ];
    for (path, message) in cases {
        let response = send(
            &gateway.router,
            Request::get(path)
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(
            header_value(&response, "cache-control"),
            Some("no-store, must-revalidate")
        );
        assert_eq!(header_value(&response, "x-content-type-options"), Some("nosniff"));

        let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
        assert_eq!(body["error"], message, "{path}");
        assert_eq!(body["status"], 400);
    }

    let response = get(
        &gateway.router,
        "/rss/?feedURL=https%3A%2F%2Fa.example%2Ffeed.xml&feedURL=https%3A%2F%2Fb.example%2Ffeed.xml",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_bytes(response).await, Bytes::from("Invalid feedURL"));
    assert_eq!(gateway.upstream.calls(), 0);
}

#[tokio::test]
async fn small_feeds_are_sent_uncompressed() {
    let gateway = gateway();

    let response = send(
        &gateway.router,
        Request::get(feed_path(SMALL_FEED_URL))
            .header(header::ACCEPT_ENCODING, "br")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "content-encoding"), None);

    let body = body_bytes(response).await;
    assert!(body.len() < 1024);
    let text = String::from_utf8(body.to_vec()).expect("utf-8 feed");
    assert!(text.contains("<title>Only</title>"));
}

#[tokio::test]
async fn brotli_failure_falls_back_to_gzip() {
    let gateway = gateway_with(Compressor::with_encoders(
        Arc::new(BrokenBrotli),
        Arc::new(GzipEncoder),
    ));

    let plain = body_bytes(get(&gateway.router, &feed_path(FEED_URL)).await).await;

    let response = send(
        &gateway.router,
        Request::get(feed_path(FEED_URL))
            .header(header::ACCEPT_ENCODING, "br")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "content-encoding"), Some("gzip"));

    let encoded = body_bytes(response).await;
    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(&encoded[..])
        .read_to_end(&mut decoded)
        .expect("gzip body");
    assert_eq!(decoded, plain.to_vec());
}

#[tokio::test]
async fn large_feeds_are_brotli_encoded_when_accepted() {
    let gateway = gateway();

    let plain = body_bytes(get(&gateway.router, &feed_path(FEED_URL)).await).await;
    assert!(plain.len() > 1024);

    let response = send(
        &gateway.router,
        Request::get(feed_path(FEED_URL))
            .header(header::ACCEPT_ENCODING, "gzip, deflate, br")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "content-encoding"), Some("br"));
    assert_eq!(
        header_value(&response, "vary"),
        Some("Accept-Encoding, Accept, If-None-Match")
    );

    let encoded = body_bytes(response).await;
    let mut decoded = Vec::new();
    brotli::Decompressor::new(&encoded[..], 4096)
        .read_to_end(&mut decoded)
        .expect("brotli body");
    assert_eq!(decoded, plain.to_vec());
}

#[tokio::test]
async fn health_and_cache_stats() {
    let gateway = gateway();

    let health = get(&gateway.router, "/_health").await;
    assert_eq!(health.status(), StatusCode::NO_CONTENT);

    get(&gateway.router, &feed_path(FEED_URL)).await;
    get(&gateway.router, &feed_path(FEED_URL)).await;

    let response = get(&gateway.router, "/_cache/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: Value = serde_json::from_slice(&body_bytes(response).await).expect("json stats");
    assert_eq!(stats["entry_count"], 1);
    assert_eq!(stats["allowlist_entries"], 1);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["hit_rate"], 0.5);
    assert!(stats["total_bytes"].as_u64().is_some_and(|bytes| bytes > 0));
    assert!(stats["oldest_timestamp"].is_string());
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let gateway = gateway();
    let response = get(&gateway.router, "/admin").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
