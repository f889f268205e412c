//! Bounded exponential-backoff retry for blocking calls to external services.

use std::fmt;
use std::time::Duration;

/// Retry settings for schema registry access.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single wait.
    pub max_backoff: Duration,
    /// Growth factor applied to the wait after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Retries without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Wait after the `attempt`-th failure (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// The last error of a retried operation and how many attempts were made.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the attempt budget
/// is spent. Blocks the calling thread between attempts.
pub fn with_retry<T, E, F, R>(
    policy: &RetryPolicy,
    retryable: R,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !retryable(&error) || attempt >= max_attempts {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                    });
                }
                let wait = policy.backoff(attempt - 1);
                tracing::warn!(
                    attempt,
                    max = max_attempts,
                    backoff_ms = wait.as_millis() as u64,
                    error = %error,
                    "retrying after transient error"
                );
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, with_retry};
    use std::cell::Cell;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn is_transient(f: &Failure) -> bool {
        *f == Failure::Transient
    }

    #[test]
    fn default_policy_matches_registry_contract() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
            multiplier: 2.0,
        };
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(800));
        assert_eq!(p.backoff(4), Duration::from_millis(1_000));
        assert_eq!(p.backoff(30), Duration::from_millis(1_000));
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let calls = Cell::new(0);
        let out = with_retry(&RetryPolicy::immediate(5), is_transient, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Failure::Transient)
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(out, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let calls = Cell::new(0);
        let out: Result<(), _> = with_retry(&RetryPolicy::immediate(5), is_transient, || {
            calls.set(calls.get() + 1);
            Err(Failure::Permanent)
        });
        let failure = out.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.error, Failure::Permanent);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn attempts_are_bounded() {
        let calls = Cell::new(0);
        let out: Result<(), _> = with_retry(&RetryPolicy::immediate(4), is_transient, || {
            calls.set(calls.get() + 1);
            Err(Failure::Transient)
        });
        assert_eq!(out.unwrap_err().attempts, 4);
        assert_eq!(calls.get(), 4);
    }
}
