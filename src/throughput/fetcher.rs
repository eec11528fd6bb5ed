//! Fetch-and-discard download primitive.
//!
//! A fetch streams one response body, counting bytes as chunks arrive and
//! dropping them immediately. Nothing is buffered beyond the current chunk.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::config::MeasureConfig;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The measurement window closed mid-transfer.
    #[error("deadline reached after {bytes} bytes")]
    DeadlineExceeded { bytes: u64 },

    #[error("invalid request for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("transfer from {url} failed after {bytes} bytes: {source}")]
    Transport {
        url: String,
        bytes: u64,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: StatusCode,
        bytes: u64,
    },
}

impl FetchError {
    /// Bytes received before the fetch stopped.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::DeadlineExceeded { bytes }
            | Self::Transport { bytes, .. }
            | Self::Status { bytes, .. } => *bytes,
            Self::Request { .. } => 0,
        }
    }

    /// Deadline expiry is how every measurement ends; anything else is a failure.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    fn from_reqwest(url: &str, bytes: u64, err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Request {
                url: url.to_string(),
                source: Box::new(err),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                bytes,
                source: Box::new(err),
            }
        }
    }
}

/// Something that can download a URL and report how many bytes arrived.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`, discard the body, and return the byte count.
    ///
    /// Must stop at `deadline` with [`FetchError::DeadlineExceeded`] carrying
    /// the bytes read so far. Called concurrently, often for the same URL.
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<u64, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: Client,
    strict_status: bool,
}

impl HttpFetcher {
    pub fn new(config: &MeasureConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config.strict_status))
    }

    pub fn with_client(client: Client, strict_status: bool) -> Self {
        Self {
            client,
            strict_status,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<u64, FetchError> {
        if Instant::now() >= deadline {
            return Err(FetchError::DeadlineExceeded { bytes: 0 });
        }

        let mut response = match timeout_at(deadline, self.client.get(url).send()).await {
            Err(_) => return Err(FetchError::DeadlineExceeded { bytes: 0 }),
            Ok(res) => res.map_err(|e| FetchError::from_reqwest(url, 0, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            if self.strict_status {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                    bytes: 0,
                });
            }
            debug!(%url, %status, "non-success status, counting body anyway");
        }

        let mut bytes = 0u64;
        loop {
            match timeout_at(deadline, response.chunk()).await {
                Err(_) => return Err(FetchError::DeadlineExceeded { bytes }),
                Ok(Ok(Some(chunk))) => bytes += chunk.len() as u64,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(FetchError::from_reqwest(url, bytes, e)),
            }
        }

        debug!(%url, bytes, "download complete");
        Ok(bytes)
    }
}
