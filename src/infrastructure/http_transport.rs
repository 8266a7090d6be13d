//! HTTP transport used by the page fetcher
//!
//! A narrow async seam over reqwest: one GET with explicit headers,
//! returning the status, body and any `Retry-After` hint. Tests swap in
//! a scripted transport.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::infrastructure::config::FetchConfig;

/// Status, body and rate-limit hint of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            retry_after: None,
        }
    }
}

/// Transport-level failure classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchFailure {
    /// Timeouts and connection problems are worth another attempt
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_) | Self::Body(_))
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<RawResponse, FetchFailure>;
}

/// Seconds-only `Retry-After`; HTTP-date values are ignored
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// reqwest-backed transport with a cookie store and compression
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<RawResponse, FetchFailure> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let value = HeaderValue::from_str(value).map_err(|e| FetchFailure::InvalidRequest(e.to_string()))?;
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchFailure::InvalidRequest(e.to_string()))?;
            header_map.insert(name, value);
        }

        let response = self.client.get(url).headers(header_map).send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.text().await?;
        tracing::debug!("🌐 {} -> {} ({} chars)", url, status, body.len());

        Ok(RawResponse {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchFailure::Timeout.is_transient());
        assert!(FetchFailure::Connect("reset".into()).is_transient());
        assert!(!FetchFailure::InvalidRequest("bad header".into()).is_transient());
    }

    #[test]
    fn test_transport_builds_from_defaults() {
        assert!(ReqwestTransport::new(&FetchConfig::default()).is_ok());
    }
}
