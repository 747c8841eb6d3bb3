//! Bounded retry with a growing backoff
//!
//! A small combinator for "retry this async operation while the error is
//! retryable, at most N times". The reconciler uses it to retry
//! get-merge-update on conflict, but nothing here is specific to secrets.
//!
//! Dropping the returned future cancels the sequence at the next await
//! point (the operation itself or the sleep between attempts).

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry budget and backoff schedule.
///
/// The delay after the n-th failed attempt is
/// `initial_delay * factor^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Growth factor per attempt
    pub factor: u32,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// 5 attempts, 10ms doubling up to 1s.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            factor: 2,
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; handy in tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        self.initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a retried operation gave up
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `last` is the final one
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error stopped the sequence
    Aborted(E),
}

impl<E> RetryError<E> {
    /// The last error seen, whichever way the sequence ended
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted(e) => e,
        }
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or the policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let budget = policy.budget();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => {
                if attempt >= budget {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt, budget, delay_ms = delay.as_millis() as u64, "Retryable failure, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(RetryError::Aborted(e)),
        }
    }
}
