use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{
            ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_SECURITY_POLICY,
            CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, VARY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    application::{
        content::{ContentResponse, ContentService},
        error::{ErrorFormat, HttpError},
        feed::{FeedOutcome, FeedService, FeedSource},
    },
    cache::{AllowlistRegistry, FeedCache},
};

use super::{
    compression::{Compressor, Encoded},
    middleware::{log_responses, set_request_context},
    negotiate::{
        Encoding, etag_of, format_http_date, is_not_modified, is_not_modified_since,
        select_encoding, should_compress,
    },
};

const FEED_CACHE_CONTROL: &str = "public, max-age=300, must-revalidate";
const FEED_VARY: &str = "Accept-Encoding, Accept, If-None-Match";
const CONTENT_CACHE_CONTROL: &str = "no-store, must-revalidate";
const CONTENT_SECURITY_POLICY_VALUE: &str =
    "default-src 'self'; img-src 'self' https:; script-src 'self'; style-src 'self' 'unsafe-inline'";
const X_CACHE: &str = "x-cache";
const X_CACHE_TIMESTAMP: &str = "x-cache-timestamp";
const X_ORIGINAL_URL: &str = "x-original-url";

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub content: Arc<ContentService>,
    pub cache: Arc<FeedCache>,
    pub allowlist: Arc<AllowlistRegistry>,
    pub compressor: Compressor,
    pub content_csp: bool,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/rss", get(rss_feed))
        .route("/rss/", get(rss_feed))
        .route("/content", get(content))
        .route("/content/", get(content))
        .route("/_health", get(health))
        .route("/_cache/stats", get(cache_stats))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedQuery {
    #[serde(rename = "feedURL")]
    feed_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentQuery {
    #[serde(rename = "contentURL")]
    content_url: Option<String>,
}

async fn rss_feed(
    State(state): State<HttpState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let format = ErrorFormat::from_headers(&headers);
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return HttpError::from_error(
                "infra::http::public::rss_feed",
                StatusCode::BAD_REQUEST,
                "Invalid feedURL",
                &rejection,
            )
            .with_format(format)
            .into_response();
        }
    };
    let Some(feed_url) = query.feed_url.filter(|url| !url.trim().is_empty()) else {
        return HttpError::new(
            "infra::http::public::rss_feed",
            StatusCode::BAD_REQUEST,
            "Missing feedURL parameter",
            "request carried no feedURL query parameter",
        )
        .with_format(format)
        .into_response();
    };

    match state.feed.load(&feed_url).await {
        Ok(outcome) => feed_response(&state, &headers, outcome),
        Err(err) => HttpError::from(err).with_format(format).into_response(),
    }
}

fn feed_response(state: &HttpState, headers: &HeaderMap, outcome: FeedOutcome) -> Response {
    let FeedOutcome { entry, source } = outcome;
    let etag = etag_of(&entry.body);

    if source == FeedSource::Hit {
        let if_none_match = header_str(headers, IF_NONE_MATCH);
        let unchanged = match if_none_match {
            Some(_) => is_not_modified(if_none_match, &etag),
            None => is_not_modified_since(header_str(headers, IF_MODIFIED_SINCE), entry.created_at),
        };
        if unchanged {
            debug!(feed = %entry.key, "conditional request matched cached feed");
            return Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(ETAG, &etag)
                .header(CACHE_CONTROL, FEED_CACHE_CONTROL)
                .header(X_CONTENT_TYPE_OPTIONS, "nosniff")
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    }

    let Encoded { encoding, body } = negotiate_body(state, headers, &entry.body);
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/xml")
        .header(CACHE_CONTROL, FEED_CACHE_CONTROL)
        .header(VARY, FEED_VARY)
        .header(ETAG, &etag)
        .header(LAST_MODIFIED, format_http_date(entry.created_at))
        .header(X_CACHE, source.as_header_value())
        .header(X_CACHE_TIMESTAMP, unix_millis(entry.created_at).to_string())
        .header(X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(X_FRAME_OPTIONS, "DENY");
    if let Some(value) = encoding.header_value() {
        builder = builder.header(CONTENT_ENCODING, value);
    }

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn negotiate_body(state: &HttpState, headers: &HeaderMap, body: &Bytes) -> Encoded {
    let encoding = select_encoding(header_str(headers, ACCEPT_ENCODING));
    if should_compress(body.len() as u64, encoding) {
        state.compressor.encode(body, encoding)
    } else {
        Encoded {
            encoding: Encoding::Identity,
            body: body.clone(),
        }
    }
}

async fn content(
    State(state): State<HttpState>,
    query: Result<Query<ContentQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let format = ErrorFormat::from_headers(&headers);
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return HttpError::from_error(
                "infra::http::public::content",
                StatusCode::BAD_REQUEST,
                "Invalid contentURL",
                &rejection,
            )
            .with_format(format)
            .into_response();
        }
    };
    let Some(content_url) = query.content_url.filter(|url| !url.trim().is_empty()) else {
        return HttpError::new(
            "infra::http::public::content",
            StatusCode::BAD_REQUEST,
            "Missing contentURL parameter",
            "request carried no contentURL query parameter",
        )
        .with_format(format)
        .into_response();
    };

    match state.content.fetch(&content_url).await {
        Ok(response) => content_response(state.content_csp, response),
        Err(err) => HttpError::from(err).with_format(format).into_response(),
    }
}

fn content_response(csp_enabled: bool, response: ContentResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CACHE_CONTROL, CONTENT_CACHE_CONTROL)
        .header(X_CONTENT_TYPE_OPTIONS, "nosniff");

    builder = match HeaderValue::from_str(&response.content_type) {
        Ok(value) => builder.header(CONTENT_TYPE, value),
        Err(_) => builder.header(CONTENT_TYPE, "application/octet-stream"),
    };
    if let Ok(value) = HeaderValue::from_str(&response.original_url) {
        builder = builder.header(X_ORIGINAL_URL, value);
    }
    if csp_enabled && response.is_html() {
        builder = builder.header(CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY_VALUE);
    }

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct CacheStatsBody {
    total_bytes: u64,
    entry_count: usize,
    allowlist_entries: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    oldest_timestamp: Option<OffsetDateTime>,
    hits: u64,
    misses: u64,
    hit_rate: f64,
    cleanups: u64,
    last_cleanup_ms: f64,
    usage_ratio: f64,
}

async fn cache_stats(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let format = ErrorFormat::from_headers(&headers);
    let stats = match state.cache.stats().await {
        Ok(stats) => stats,
        Err(err) => return HttpError::from(err).with_format(format).into_response(),
    };
    let allowlist_entries = match state.allowlist.len().await {
        Ok(count) => count,
        Err(err) => return HttpError::from(err).with_format(format).into_response(),
    };

    let body = CacheStatsBody {
        total_bytes: stats.total_bytes,
        entry_count: stats.entry_count,
        allowlist_entries,
        oldest_timestamp: stats.oldest_timestamp,
        hits: stats.metrics.hits,
        misses: stats.metrics.misses,
        hit_rate: stats.metrics.hit_rate(),
        cleanups: stats.metrics.cleanups,
        last_cleanup_ms: stats.metrics.last_cleanup_duration.as_secs_f64() * 1000.0,
        usage_ratio: stats.usage_ratio,
    };

    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

async fn not_found(headers: HeaderMap) -> Response {
    HttpError::new(
        "infra::http::public::not_found",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched the request path",
    )
    .with_format(ErrorFormat::from_headers(&headers))
    .into_response()
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn unix_millis(at: OffsetDateTime) -> i128 {
    at.unix_timestamp_nanos() / 1_000_000
}
