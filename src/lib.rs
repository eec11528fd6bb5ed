//! fastmeter -- download throughput measurement against fast.com endpoints.
//!
//! Discovers Netflix Open Connect download URLs the way the fast.com web app
//! does, then saturates them with a bounded number of parallel downloads for a
//! fixed window and reports the mean rate.

pub mod config;
pub mod throughput;

use std::sync::Arc;

use config::FastmeterConfig;
use throughput::provider::FastProvider;
use throughput::{Coordinator, HttpFetcher, ThroughputError};

/// Build a coordinator wired to fast.com discovery and the HTTP fetcher.
pub fn coordinator(config: &FastmeterConfig) -> Result<Coordinator, ThroughputError> {
    let source = FastProvider::new(&config.provider, &config.measure.user_agent)?;
    let fetcher = HttpFetcher::new(&config.measure)?;
    Ok(Coordinator::new(
        config.measure.clone(),
        Arc::new(source),
        Arc::new(fetcher),
    ))
}

/// Measure download throughput in bytes/second with the given configuration.
pub async fn measure(config: &FastmeterConfig) -> Result<f64, ThroughputError> {
    coordinator(config)?.measure().await
}
