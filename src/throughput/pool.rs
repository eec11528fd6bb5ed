use std::sync::atomic::{AtomicUsize, Ordering};

use super::ThroughputError;

/// Download URLs for one run, handed out round-robin.
///
/// Dispatch `n` always gets `urls[n % len]`. The counter is shared by every
/// caller and only ever moves forward.
#[derive(Debug)]
pub struct EndpointPool {
    urls: Vec<String>,
    dispatched: AtomicUsize,
}

impl EndpointPool {
    /// Build a pool; an empty list is rejected up front.
    pub fn new(urls: Vec<String>) -> Result<Self, ThroughputError> {
        if urls.is_empty() {
            return Err(ThroughputError::EmptyPool);
        }
        Ok(Self {
            urls,
            dispatched: AtomicUsize::new(0),
        })
    }

    /// Claim the next dispatch sequence number and return its endpoint.
    pub fn next_endpoint(&self) -> &str {
        let seq = self.dispatched.fetch_add(1, Ordering::Relaxed);
        &self.urls[seq % self.urls.len()]
    }

    /// Number of endpoints handed out so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}
