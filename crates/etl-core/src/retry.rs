//! Retry with exponential backoff for unreliable sources.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{Error, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// One backoff time unit
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after the failed zero-indexed `attempt`: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Network, timeout or server-side failure; worth another attempt
    Transient(anyhow::Error),
    /// Fails the fetch immediately, bypassing retry
    Permanent(Error),
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// The operation receives the zero-indexed attempt number. Exhaustion fails
/// with `SourceUnavailable` carrying the last cause; cancellation during a
/// backoff wait fails with `Cancelled`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    source_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Permanent(err)) => {
                error!(source = source_name, attempt = attempt + 1, "Non-retryable failure: {}", err);
                return Err(err);
            }
            Err(AttemptError::Transient(cause)) => {
                let attempts_made = attempt + 1;
                warn!(
                    source = source_name,
                    attempt = attempts_made,
                    max_attempts = policy.max_attempts,
                    "Attempt failed: {}",
                    cause
                );

                if attempts_made >= policy.max_attempts {
                    error!(
                        source = source_name,
                        "Giving up after {} attempt(s)", attempts_made
                    );
                    return Err(Error::SourceUnavailable {
                        source_name: source_name.to_string(),
                        attempts: attempts_made,
                        cause,
                    });
                }

                let delay = policy.delay_for(attempt);
                info!(source = source_name, "Retrying in {:?}", delay);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_policy_needs_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, DEFAULT_BASE_DELAY).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_source_is_tried_exactly_max_attempts() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut calls: Vec<Instant> = Vec::new();

        let result: Result<()> = retry_with_backoff(&policy, "api", &cancel, |_| {
            calls.push(Instant::now());
            async { Err(AttemptError::Transient(anyhow::anyhow!("connection refused"))) }
        })
        .await;

        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));
        match result {
            Err(Error::SourceUnavailable { attempts, cause, .. }) => {
                assert_eq!(attempts, 3);
                assert!(cause.to_string().contains("connection refused"));
            }
            other => panic!("expected SourceUnavailable, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();

        let result = retry_with_backoff(&policy, "api", &cancel, |attempt| async move {
            if attempt == 0 {
                Err(AttemptError::Transient(anyhow::anyhow!("timeout")))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_bypasses_retry() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(&policy, "api", &cancel, |_| {
            calls += 1;
            async { Err(AttemptError::Permanent(Error::InvalidSourceFormat("not json".into()))) }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::InvalidSourceFormat(_))));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: Result<()> = retry_with_backoff(&policy, "api", &cancel, |_| {
            trigger.cancel();
            async { Err(AttemptError::Transient(anyhow::anyhow!("503"))) }
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
