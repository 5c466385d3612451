//! HTTP fetching for search pages, detail pages and cover images.

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Something that can GET a URL.
///
/// Implementations make a single attempt per call; retrying is left to the
/// caller.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a page and returns its decoded body.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetches raw bytes (cover images).
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher with its own cookie jar.
///
/// Every request made through one fetcher shares the jar, so cookies set by
/// the search page are sent with the detail pages that follow.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::new(Jar::default()))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let text = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        tracing::debug!(url, bytes = text.len(), "download complete");
        Ok(text)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        tracing::debug!(url, bytes = bytes.len(), "download complete");
        Ok(bytes.to_vec())
    }
}
