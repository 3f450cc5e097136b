use std::error::Error as StdError;

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{
    application::{content::ContentError, feed::FeedError},
    cache::CacheError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Body representation of an error response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorFormat {
    #[default]
    Text,
    Json,
}

impl ErrorFormat {
    /// JSON when the client's `Accept` header names `application/json`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_json = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|accept| accept.contains("application/json"));
        if wants_json {
            ErrorFormat::Json
        } else {
            ErrorFormat::Text
        }
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    format: ErrorFormat,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            format: ErrorFormat::Text,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            format: ErrorFormat::Text,
            report,
        }
    }

    pub fn with_format(mut self, format: ErrorFormat) -> Self {
        self.format = format;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn public_message(&self) -> &'static str {
        self.public_message
    }

    fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            error,
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = match self.format {
            ErrorFormat::Text => (self.status, self.public_message).into_response(),
            ErrorFormat::Json => (
                self.status,
                Json(json!({
                    "error": self.public_message,
                    "status": self.status.as_u16(),
                })),
            )
                .into_response(),
        };
        let headers = response.headers_mut();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, must-revalidate"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        self.report.attach(&mut response);
        response
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        const SOURCE: &str = "infra::http::feed_error_to_http_error";
        match &error {
            FeedError::InvalidUrl(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid feedURL",
                &error,
            ),
            FeedError::Upstream(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Failed to fetch RSS feed",
                &error,
            ),
            FeedError::Document(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Failed to parse RSS feed",
                &error,
            ),
            FeedError::Cache(_) => HttpError::internal(SOURCE, &error),
        }
    }
}

impl From<ContentError> for HttpError {
    fn from(error: ContentError) -> Self {
        const SOURCE: &str = "infra::http::content_error_to_http_error";
        match &error {
            ContentError::InvalidUrl(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid contentURL",
                &error,
            ),
            ContentError::NotAllowed(_) => HttpError::from_error(
                SOURCE,
                StatusCode::FORBIDDEN,
                "URL not found in allowed list",
                &error,
            ),
            ContentError::Upstream(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Failed to fetch content",
                &error,
            ),
            ContentError::Cache(_) => HttpError::internal(SOURCE, &error),
        }
    }
}

impl From<CacheError> for HttpError {
    fn from(error: CacheError) -> Self {
        HttpError::internal("infra::http::cache_error_to_http_error", &error)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::upstream::UpstreamError;
    use crate::domain::error::DocumentError;

    #[test]
    fn feed_errors_map_to_public_statuses() {
        let cases = [
            (
                FeedError::InvalidUrl("x".into()),
                StatusCode::BAD_REQUEST,
                "Invalid feedURL",
            ),
            (
                FeedError::Upstream(UpstreamError::Timeout { url: "u".into() }),
                StatusCode::BAD_GATEWAY,
                "Failed to fetch RSS feed",
            ),
            (
                FeedError::Document(DocumentError::parse("bad")),
                StatusCode::BAD_GATEWAY,
                "Failed to parse RSS feed",
            ),
        ];
        for (error, status, message) in cases {
            let http = HttpError::from(error);
            assert_eq!(http.status(), status);
            assert_eq!(http.public_message(), message);
        }
    }

    #[test]
    fn content_errors_map_to_public_statuses() {
        let http = HttpError::from(ContentError::NotAllowed("u".into()));
        assert_eq!(http.status(), StatusCode::FORBIDDEN);
        assert_eq!(http.public_message(), "URL not found in allowed list");

        let http = HttpError::from(ContentError::Upstream(UpstreamError::Timeout {
            url: "u".into(),
        }));
        assert_eq!(http.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(http.public_message(), "Failed to fetch content");
    }

    #[test]
    fn json_is_selected_from_accept() {
        let mut headers = HeaderMap::new();
        assert_eq!(ErrorFormat::from_headers(&headers), ErrorFormat::Text);
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain"),
        );
        assert_eq!(ErrorFormat::from_headers(&headers), ErrorFormat::Json);
    }

    #[test]
    fn report_is_attached_to_response() {
        let response = HttpError::new(
            "test",
            StatusCode::BAD_REQUEST,
            "Missing feedURL parameter",
            "query had no feedURL",
        )
        .into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["query had no feedURL".to_string()]);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store, must-revalidate"
        );
    }
}
