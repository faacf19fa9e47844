/// Bounded retry for transient store failures.
///
/// Layered around a store client so the retrieval channels and fusion never see retries.
/// Exponential backoff: base, 2x base, 4x base... Only `StoreError::is_transient()`
/// failures are retried; the last error is returned once attempts run out.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{CoordinateLookup, DocumentStore, PlaceCandidate, SearchHit, StoreError};
use crate::config::RetryConfig;

/// Upper bound on a single backoff sleep
pub const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy::new(1, Duration::ZERO)
    }

    /// Backoff before retry number `attempt + 1`, capped at `MAX_DELAY`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }
}

/// Wraps a store client and applies a `RetryPolicy` to every call.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        RetryingStore { inner, policy }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for RetryingStore<S> {
    async fn search(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.policy
            .run("search", || self.inner.search(index, body))
            .await
    }
}

#[async_trait]
impl<S: CoordinateLookup> CoordinateLookup for RetryingStore<S> {
    async fn lookup(&self, name: &str) -> Result<Vec<PlaceCandidate>, StoreError> {
        self.policy
            .run("coordinate_lookup", || self.inner.lookup(name))
            .await
    }
}
