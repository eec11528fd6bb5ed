//! Download throughput engine: endpoint discovery, fetch-and-discard workers,
//! and the deadline-bounded coordinator that drives them.

pub mod coordinator;
pub mod fetcher;
pub mod pool;
pub mod provider;
pub mod report;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub use coordinator::Coordinator;
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use pool::EndpointPool;
pub use provider::{EndpointSource, ProviderError, StaticEndpoints};

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("endpoint pool is empty; nothing to measure against")]
    EmptyPool,

    #[error("endpoint discovery failed: {0}")]
    Source(#[from] ProviderError),

    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("measurement window of {0:?} does not fit on the clock")]
    WindowTooLong(std::time::Duration),

    #[error("concurrency limiter closed: {0}")]
    Limiter(#[from] tokio::sync::AcquireError),

    #[error("download task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Outcome of one measurement run.
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputResult {
    pub bytes_per_second: f64,
    pub megabits_per_second: f64,
    pub bytes_total: u64,
    pub endpoints: usize,
    pub concurrency: usize,
    pub duration_secs: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ThroughputResult {
    /// Reduce a byte total and the wall time it took into a rate.
    pub fn from_totals(
        bytes_total: u64,
        elapsed: Duration,
        endpoints: usize,
        concurrency: usize,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let bytes_per_second = if secs > 0.0 {
            bytes_total as f64 / secs
        } else {
            0.0
        };

        Self {
            bytes_per_second,
            megabits_per_second: bytes_per_second * 8.0 / 1_000_000.0,
            bytes_total,
            endpoints,
            concurrency,
            duration_secs: secs,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_totals_rate() {
        let res = ThroughputResult::from_totals(12_500_000, Duration::from_secs(10), 5, 8);
        assert!((res.bytes_per_second - 1_250_000.0).abs() < 1e-6);
        assert!((res.megabits_per_second - 10.0).abs() < 1e-9);
        assert_eq!(res.endpoints, 5);
        assert_eq!(res.concurrency, 8);
    }

    #[test]
    fn test_from_totals_zero_elapsed() {
        let res = ThroughputResult::from_totals(1000, Duration::ZERO, 1, 1);
        assert_eq!(res.bytes_per_second, 0.0);
    }
}
