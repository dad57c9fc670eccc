//! Model sources.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::LoadError;

/// Something that can download a model payload by its canonical URL.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Download the full payload for `url`.
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, LoadError>;
}

/// Fetches model payloads over HTTP(S).
pub struct HttpModelFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpModelFetcher {
    /// Create a fetcher with a two minute request timeout.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for HttpModelFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelFetcher for HttpModelFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, LoadError> {
        debug!("Fetching model from {url}");

        let fetch_error = |e: reqwest::Error| LoadError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(fetch_error)?;
        if bytes.is_empty() {
            return Err(LoadError::EmptyPayload {
                url: url.to_string(),
            });
        }

        info!("Fetched {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}
