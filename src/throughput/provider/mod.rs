use async_trait::async_trait;
use thiserror::Error;

pub mod fast;

pub use fast::FastProvider;

/// Why endpoint discovery failed. Each scraping stage reports its own variant
/// so an empty pool never masquerades as success.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no app script reference found on {url}")]
    ScriptNotFound { url: String },

    #[error("no API token found in {url}")]
    TokenNotFound { url: String },

    #[error("no download URLs found in response from {url}")]
    NoUrls { url: String },
}

/// Supplies the ordered list of download URLs for one measurement run.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn list_endpoints(&self) -> Result<Vec<String>, ProviderError>;
}

/// A fixed endpoint list, used when URLs are given on the command line.
#[derive(Debug, Clone)]
pub struct StaticEndpoints(pub Vec<String>);

#[async_trait]
impl EndpointSource for StaticEndpoints {
    async fn list_endpoints(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.0.clone())
    }
}
