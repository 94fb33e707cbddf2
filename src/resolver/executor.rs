use super::Candidate;
use crate::config::UpstreamConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, REFERER};
use reqwest::Client;
use std::error::Error as _;
use std::time::Duration;

/// Whatever came back over the wire, before any judgement.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// The request never produced a complete response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    #[error("network error: {detail}")]
    Network { detail: String },
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout { after: timeout };
        }
        // reqwest's top-level message hides the useful part (dns, refused, tls)
        let mut detail = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        TransportError::Network { detail }
    }
}

/// One GET against one candidate, bounded by `timeout`.
///
/// Non-2xx responses are returned as `Ok`; judging them is the classifier's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, candidate: &Candidate, timeout: Duration) -> Result<RawResponse, TransportError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&config.accept).context("invalid upstream.accept header")?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&config.referer).context("invalid upstream.referer header")?,
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        Ok(RawResponse { status, headers, body })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, candidate: &Candidate, timeout: Duration) -> Result<RawResponse, TransportError> {
        let url = candidate.url();
        // Dropping the inner future on expiry aborts the request and frees its connection.
        match tokio::time::timeout(timeout, self.get(&url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout { after: timeout }),
        }
    }
}
