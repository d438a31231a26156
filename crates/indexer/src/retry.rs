//! Bounded exponential-backoff retry for async operations.
//!
//! The executor does not inspect errors. Deciding whether a failure should
//! rotate an endpoint is left to the caller (see [`crate::rpc::EndpointPool`]).

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Retry behavior for one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Multiplier applied to the delay after every further failure.
    pub backoff_factor: u32,

    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the given failed attempt (1-based):
    /// `base_delay * backoff_factor^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.backoff_factor.max(1).saturating_pow(exponent);
        self.base_delay.saturating_mul(factor)
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// The attempt exceeded the policy timeout.
    Timeout(Duration),
    /// The operation returned an error.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Every attempt failed. Carries the last failure, tagged with the
/// operation name.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Operation name.
    pub name: String,
    /// Attempts made.
    pub attempts: u32,
    /// Last failure.
    pub last: AttemptError<E>,
}

impl<E> RetryError<E> {
    /// The last operation error, if the last attempt did not time out.
    pub fn source_error(&self) -> Option<&E> {
        match &self.last {
            AttemptError::Failed(err) => Some(err),
            AttemptError::Timeout(_) => None,
        }
    }

    /// Whether the last attempt timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self.last, AttemptError::Timeout(_))
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.name, self.attempts, self.last
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

impl RetryError<anyhow::Error> {
    /// Convert into an `anyhow::Error`, keeping the inner error chain.
    pub fn into_anyhow(self) -> anyhow::Error {
        let context = format!("{} failed after {} attempt(s)", self.name, self.attempts);
        match self.last {
            AttemptError::Failed(err) => err.context(context),
            AttemptError::Timeout(after) => {
                anyhow::anyhow!("{}: timed out after {}ms", context, after.as_millis())
            }
        }
    }
}

/// Run `operation` until it succeeds or `policy.attempts` is exhausted.
///
/// Sleeps `policy.delay_for(attempt)` between attempts. With a timeout set,
/// each attempt races a timer and counts as failed when the timer wins.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(AttemptError::Failed),
                Err(_) => Err(AttemptError::Timeout(limit)),
            },
            None => operation().await.map_err(AttemptError::Failed),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= attempts {
            return Err(RetryError {
                name: name.to_string(),
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "{} failed; retrying",
            name
        );
        sleep(delay).await;
        attempt += 1;
    }
}
