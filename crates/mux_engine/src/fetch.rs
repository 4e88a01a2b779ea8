use std::time::Duration;

use futures_util::StreamExt;
use mux_core::{FailureKind, FetchError, FetchResult, Headers};
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

/// Transport tuning for [`ReqwestFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(60),
            pool_max_idle_per_host: 4,
            user_agent: concat!("mux/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Performs a single GET. Implementations must be safe to call concurrently
/// and must return promptly with `FailureKind::Cancelled` once `cancel` fires.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancellationToken)
        -> Result<FetchResult, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .user_agent(settings.user_agent)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, format!("{url}: {err}")))?;

        let response = cancel
            .run_until_cancelled(self.client.get(parsed).send())
            .await
            .ok_or_else(FetchError::cancelled)?
            .map_err(map_reqwest_error)?;

        let status_code = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = cancel
            .run_until_cancelled(stream.next())
            .await
            .ok_or_else(FetchError::cancelled)?
        {
            let chunk =
                chunk.map_err(|err| FetchError::new(FailureKind::Body, err.to_string()))?;
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResult {
            status_code,
            headers,
            body,
        })
    }
}

fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_body() || err.is_decode() {
        return FetchError::new(FailureKind::Body, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
