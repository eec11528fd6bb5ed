//! Deadline-bounded, round-robin download dispatch.
//!
//! One run: list endpoints once, then keep up to `concurrency` downloads in
//! flight until the measurement window closes, join the stragglers, and divide
//! the bytes received by the wall time taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::fetcher::{FetchError, Fetcher};
use super::pool::EndpointPool;
use super::provider::EndpointSource;
use super::{ThroughputError, ThroughputResult};
use crate::config::MeasureConfig;

pub struct Coordinator {
    config: MeasureConfig,
    source: Arc<dyn EndpointSource>,
    fetcher: Arc<dyn Fetcher>,
}

impl Coordinator {
    pub fn new(
        config: MeasureConfig,
        source: Arc<dyn EndpointSource>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            source,
            fetcher,
        }
    }

    /// Run one measurement and return the mean throughput in bytes/second.
    pub async fn measure(&self) -> Result<f64, ThroughputError> {
        Ok(self.run().await?.bytes_per_second)
    }

    /// Run one measurement and return the full result.
    ///
    /// Deadline expiry is the normal way a run ends and is never an error.
    /// Any other failure aborts the run immediately; downloads still in
    /// flight are cancelled and their bytes discarded.
    pub async fn run(&self) -> Result<ThroughputResult, ThroughputError> {
        let pool = EndpointPool::new(self.source.list_endpoints().await?)?;
        let concurrency = self.config.concurrency;

        info!(
            endpoints = pool.urls().len(),
            concurrency,
            duration_ms = self.config.duration.as_millis() as u64,
            "starting measurement"
        );

        let limiter = Arc::new(Semaphore::new(concurrency));
        let received = Arc::new(AtomicU64::new(0));
        let mut in_flight = JoinSet::new();

        let start = Instant::now();
        let deadline = start
            .checked_add(self.config.duration)
            .ok_or(ThroughputError::WindowTooLong(self.config.duration))?;
        let drain_deadline = deadline
            .checked_add(self.config.drain_timeout)
            .ok_or(ThroughputError::WindowTooLong(self.config.drain_timeout))?;

        loop {
            tokio::select! {
                biased;

                _ = sleep_until(deadline) => break,

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    settle(joined)?;
                }

                permit = Arc::clone(&limiter).acquire_owned() => {
                    let permit = permit?;
                    let url = pool.next_endpoint().to_string();
                    let fetcher = Arc::clone(&self.fetcher);
                    let received = Arc::clone(&received);

                    in_flight.spawn(async move {
                        let _permit = permit;
                        let outcome = fetcher.fetch(&url, deadline).await;
                        let bytes = match &outcome {
                            Ok(bytes) => *bytes,
                            Err(e) => e.bytes(),
                        };
                        received.fetch_add(bytes, Ordering::Relaxed);
                        outcome.map(drop)
                    });
                }
            }
        }

        debug!(
            dispatched = pool.dispatched(),
            in_flight = in_flight.len(),
            "measurement window closed, draining"
        );

        loop {
            match timeout_at(drain_deadline, in_flight.join_next()).await {
                Ok(Some(joined)) => settle(joined)?,
                Ok(None) => break,
                Err(_) => {
                    debug!(
                        abandoned = in_flight.len(),
                        "drain timeout reached, cancelling remaining downloads"
                    );
                    in_flight.abort_all();
                    break;
                }
            }
        }

        let elapsed = start.elapsed();
        let result = ThroughputResult::from_totals(
            received.load(Ordering::Relaxed),
            elapsed,
            pool.urls().len(),
            concurrency,
        );

        info!(
            bytes = result.bytes_total,
            elapsed_ms = elapsed.as_millis() as u64,
            mbps = result.megabits_per_second,
            "measurement complete"
        );
        Ok(result)
    }
}

/// Classify a finished download: deadline expiry passes, anything else aborts.
fn settle(joined: Result<Result<(), FetchError>, JoinError>) -> Result<(), ThroughputError> {
    match joined? {
        Ok(()) => Ok(()),
        Err(e) if e.is_expected() => {
            debug!(bytes = e.bytes(), "download cut off by deadline");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "download failed, aborting measurement");
            Err(e.into())
        }
    }
}
