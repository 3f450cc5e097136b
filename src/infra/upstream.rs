//! `reqwest`-backed implementation of the outbound fetch port.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::application::upstream::{Upstream, UpstreamError, UpstreamResponse};
use crate::config::UpstreamSettings;

use super::error::InfraError;

#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_settings(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        Self::new(settings.timeout, &settings.user_agent)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| map_reqwest_error(url, err))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(url, err))?;

        debug!(%url, status, size_bytes = body.len(), "upstream responded");

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

fn map_reqwest_error(url: &Url, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout {
            url: url.to_string(),
        }
    } else {
        UpstreamError::network(url, err.to_string())
    }
}
