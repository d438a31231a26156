//! Per-chain RPC rate limiter.
//!
//! A `governor` token bucket refilled on a fixed period, plus a semaphore
//! bounding in-flight requests.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

/// Token bucket plus concurrency bound for one chain.
pub struct RateLimiter {
    chain: String,
    bucket: DefaultDirectRateLimiter,
    in_flight: Semaphore,
}

impl RateLimiter {
    /// Allow `capacity` requests per `refill` period, at most
    /// `max_concurrent` at a time.
    pub fn new(chain: &str, capacity: u32, refill: Duration, max_concurrent: usize) -> Self {
        let capacity = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
        let period = refill / capacity.get();
        let quota = Quota::with_period(period)
            .map(|quota| quota.allow_burst(capacity))
            .unwrap_or_else(|| Quota::per_second(capacity));

        Self {
            chain: chain.to_string(),
            bucket: governor::RateLimiter::direct(quota),
            in_flight: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Wait for a token and an in-flight slot.
    ///
    /// The returned permit releases the slot when dropped.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        if self.bucket.check().is_err() {
            debug!(chain = %self.chain, "RPC request queued due to rate limit");
            self.bucket.until_ready().await;
        }

        if self.in_flight.available_permits() == 0 {
            debug!(chain = %self.chain, "RPC request waiting for an in-flight slot");
        }

        self.in_flight.acquire().await.ok()
    }

    /// Free in-flight slots.
    pub fn available(&self) -> usize {
        self.in_flight.available_permits()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("chain", &self.chain)
            .field("available", &self.available())
            .finish()
    }
}
