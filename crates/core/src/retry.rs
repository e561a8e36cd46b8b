//! Backoff arithmetic and the shared transient-retry helper.
//!
//! Every call site that retries (asset upload, queue-full task
//! creation) goes through one of these instead of hand-rolling its own
//! loop, so retry behaviour stays uniform and tunable in one place.

use std::future::Future;
use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// A bounded retry budget with exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the attempt
/// budget runs out.
///
/// `is_transient` classifies errors: a non-transient error aborts
/// immediately and is returned as-is. On budget exhaustion the last
/// transient error is returned. The caller distinguishes the two by
/// inspecting the error itself.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.backoff.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < policy.max_attempts => {
                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, backing off before retry",
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, &policy.backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn next_delay_doubles() {
        let config = BackoffConfig::default();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(8), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = BackoffConfig::default();
        let mut delay = config.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                multiplier: 2.0,
            },
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_transient(&fast_policy(5), |_| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("503")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_budget_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_transient(&fast_policy(3), |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("timeout") }
        })
        .await;

        assert_eq!(result, Err("timeout"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> =
            retry_transient(&fast_policy(5), |e| *e != "400", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("400") }
            })
            .await;

        assert_eq!(result, Err("400"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
