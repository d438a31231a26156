//! Per-chain endpoint pool with failover.
//!
//! Calls go to the active endpoint through the rate limiter and the retry
//! executor. A transient failure rotates to the next endpoint (wrapping
//! around) until the pool is exhausted. Success never rotates back.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use tokio::sync::watch;
use tracing::warn;

use super::errors::TransientError;
use super::limiter::RateLimiter;
use crate::retry::{with_retry, RetryError, RetryPolicy};

/// Mask an RPC URL for logging: the scheme is dropped and only the first 6
/// and last 4 characters survive.
pub fn mask_url(url: &str) -> String {
    let trimmed = url.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let sanitized = if lowered.starts_with("https://") {
        &trimmed[8..]
    } else if lowered.starts_with("http://") {
        &trimmed[7..]
    } else {
        trimmed
    };

    let chars: Vec<char> = sanitized.chars().collect();
    if chars.len() <= 10 {
        return "***".to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

/// One candidate endpoint.
pub struct Endpoint<C> {
    url: String,
    masked: String,
    client: C,
}

impl<C> Endpoint<C> {
    /// Wrap a client built for `url`.
    pub fn new(url: impl Into<String>, client: C) -> Self {
        let url = url.into();
        let masked = mask_url(&url);
        Self {
            url,
            masked,
            client,
        }
    }

    /// Raw URL. Never log this.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Masked URL, safe to log.
    pub fn masked(&self) -> &str {
        &self.masked
    }
}

/// Ordered endpoints for one chain and the index of the active one.
pub struct EndpointPool<C> {
    chain: String,
    endpoints: Vec<Endpoint<C>>,
    current: AtomicUsize,
    limiter: RateLimiter,
    retry: RetryPolicy,
    rotations: watch::Sender<usize>,
}

impl<C: Clone> EndpointPool<C> {
    /// Create a pool. The first endpoint starts active.
    pub fn new(
        chain: &str,
        endpoints: Vec<Endpoint<C>>,
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            bail!("No RPC endpoints configured for {}", chain);
        }

        let (rotations, _) = watch::channel(0);

        Ok(Self {
            chain: chain.to_string(),
            endpoints,
            current: AtomicUsize::new(0),
            limiter,
            retry,
            rotations,
        })
    }

    /// Chain key.
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; an empty pool cannot be built.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Index of the active endpoint.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Masked URL of the active endpoint.
    pub fn current_masked(&self) -> &str {
        self.endpoints[self.current_index()].masked()
    }

    /// Observe rotations. The value is the newly active index.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.rotations.subscribe()
    }

    /// Move off `failed`. Only the first caller that observed `failed`
    /// rotates; later callers see the index already moved and keep it.
    fn rotate_from(&self, failed: usize) -> usize {
        let next = (failed + 1) % self.endpoints.len();
        match self
            .current
            .compare_exchange(failed, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.rotations.send_replace(next);
                next
            }
            Err(actual) => actual,
        }
    }

    /// Run `operation` against the active endpoint with rate limiting,
    /// retry and failover.
    ///
    /// Non-transient errors are returned immediately. When every endpoint
    /// has failed transiently, the last error is returned.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        mut operation: F,
    ) -> std::result::Result<T, RetryError<E>>
    where
        E: TransientError + fmt::Display,
        F: FnMut(C) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let task = format!("{}:{}", self.chain, name);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let index = self.current_index();
            let client = self.endpoints[index].client.clone();

            let result = with_retry(&self.retry, &task, || {
                let call = operation(client.clone());
                async move {
                    let _permit = self.limiter.acquire().await;
                    call.await
                }
            })
            .await;

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= self.endpoints.len() {
                return Err(err);
            }

            let next = self.rotate_from(index);
            warn!(
                chain = %self.chain,
                task = %name,
                attempt,
                failed_rpc = %self.endpoints[index].masked(),
                next_rpc = %self.endpoints[next].masked(),
                error = %err,
                "RPC failed; switching endpoint"
            );
        }
    }
}

impl<C> fmt::Debug for EndpointPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<&str> = self.endpoints.iter().map(|e| e.masked()).collect();
        f.debug_struct("EndpointPool")
            .field("chain", &self.chain)
            .field("endpoints", &masked)
            .field("current", &self.current.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug)]
    enum MockError {
        Timeout,
        Rejected,
    }

    impl fmt::Display for MockError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Timeout => f.write_str("request timed out"),
                Self::Rejected => f.write_str("invalid params"),
            }
        }
    }

    impl TransientError for MockError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Timeout)
        }
    }

    /// Fake node: `healthy[i]` decides whether endpoint i answers.
    #[derive(Clone)]
    struct MockClient {
        id: usize,
        healthy: Arc<Mutex<Vec<bool>>>,
        calls: Arc<Vec<AtomicU32>>,
    }

    impl MockClient {
        async fn block_number(&self) -> std::result::Result<u64, MockError> {
            self.calls[self.id].fetch_add(1, Ordering::SeqCst);
            if self.healthy.lock().unwrap()[self.id] {
                Ok(100 + self.id as u64)
            } else {
                Err(MockError::Timeout)
            }
        }
    }

    fn pool(healthy: Vec<bool>) -> (EndpointPool<MockClient>, Arc<Mutex<Vec<bool>>>, Arc<Vec<AtomicU32>>) {
        let n = healthy.len();
        let healthy = Arc::new(Mutex::new(healthy));
        let calls = Arc::new((0..n).map(|_| AtomicU32::new(0)).collect::<Vec<_>>());

        let endpoints = (0..n)
            .map(|id| {
                Endpoint::new(
                    format!("https://rpc-{}.example.org/v2/secret-key", id),
                    MockClient {
                        id,
                        healthy: healthy.clone(),
                        calls: calls.clone(),
                    },
                )
            })
            .collect();

        let retry = RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2,
            timeout: None,
        };
        let limiter = RateLimiter::new("sepolia", 1000, Duration::from_secs(1), 4);
        let pool = EndpointPool::new("sepolia", endpoints, limiter, retry).unwrap();

        (pool, healthy, calls)
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://eth-sepolia.g.alchemy.com/v2/abcd1234"),
            "eth-se***1234"
        );
        assert_eq!(mask_url("http://localhost:8545"), "localh***8545");
        assert_eq!(mask_url("https://short.io"), "***");
        assert_eq!(mask_url(""), "***");
    }

    #[test]
    fn test_empty_pool_rejected() {
        let limiter = RateLimiter::new("sepolia", 10, Duration::from_secs(1), 2);
        let result =
            EndpointPool::<MockClient>::new("sepolia", Vec::new(), limiter, RetryPolicy::default());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failover_sticks_to_next_endpoint() {
        let (pool, healthy, calls) = pool(vec![false, true, true]);
        let mut rotations = pool.subscribe();

        let block = pool
            .execute("getBlockNumber", |client| async move { client.block_number().await })
            .await
            .unwrap();
        assert_eq!(block, 101);
        assert_eq!(pool.current_index(), 1);
        assert!(rotations.has_changed().unwrap());
        assert_eq!(*rotations.borrow_and_update(), 1);

        // subsequent calls stay on #2
        for _ in 0..3 {
            let block = pool
                .execute("getBlockNumber", |client| async move { client.block_number().await })
                .await
                .unwrap();
            assert_eq!(block, 101);
        }
        assert_eq!(calls[0].load(Ordering::SeqCst), 2);
        assert_eq!(pool.current_index(), 1);

        // until #2 fails too
        healthy.lock().unwrap()[1] = false;
        let block = pool
            .execute("getBlockNumber", |client| async move { client.block_number().await })
            .await
            .unwrap();
        assert_eq!(block, 102);
        assert_eq!(pool.current_index(), 2);
    }

    #[tokio::test]
    async fn test_rotation_wraps_around() {
        let (pool, healthy, _) = pool(vec![true, true, false]);

        healthy.lock().unwrap()[0] = false;
        pool.execute("getBlockNumber", |client| async move { client.block_number().await })
            .await
            .unwrap();
        assert_eq!(pool.current_index(), 1);

        healthy.lock().unwrap()[0] = true;
        healthy.lock().unwrap()[1] = false;
        let block = pool
            .execute("getBlockNumber", |client| async move { client.block_number().await })
            .await
            .unwrap();
        // 1 -> 2 (down) -> 0
        assert_eq!(block, 100);
        assert_eq!(pool.current_index(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_pool_returns_last_error() {
        let (pool, _, calls) = pool(vec![false, false, false]);

        let err = pool
            .execute("getBlockNumber", |client| async move { client.block_number().await })
            .await
            .unwrap_err();

        assert!(matches!(err.source_error(), Some(MockError::Timeout)));
        for counter in calls.iter() {
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test]
    async fn test_application_error_does_not_rotate() {
        let (pool, _, _) = pool(vec![true, true]);

        let err = pool
            .execute("getLogs", |_client| async move {
                Err::<(), _>(MockError::Rejected)
            })
            .await
            .unwrap_err();

        assert!(matches!(err.source_error(), Some(MockError::Rejected)));
        assert_eq!(pool.current_index(), 0);
    }

    #[test]
    fn test_concurrent_failures_rotate_once() {
        let (pool, _, _) = pool(vec![true, true, true]);

        assert_eq!(pool.rotate_from(0), 1);
        // a second caller that also saw index 0 fail
        assert_eq!(pool.rotate_from(0), 1);
        assert_eq!(pool.current_index(), 1);
    }
}
