//! Retry with explicit backoff policy.
//!
//! A [`BackoffPolicy`] is a plain value (attempt budget, exponential base
//! delay, jitter bound) consumed by [`BackoffPolicy::execute`]. Only
//! transient-capacity failures are retried; connectivity and fatal errors
//! abort immediately so the caller's tier logic can advance.

use std::time::Duration;

use rand::Rng;

use crate::error::{ErrorClass, LoomError, LoomResult};
use crate::model::{ProgressPhase, RetryContext};

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first (>= 1).
    pub max_attempts: u32,
    /// Doubled on each retry: wait = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Uniform random addition in [0, max_jitter].
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Policy with no waiting at all; used by tests and by callers that
    /// implement their own pacing.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Wait before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        if self.max_jitter.is_zero() {
            return exponential;
        }
        let jitter_secs = rand::thread_rng().gen_range(0.0..=self.max_jitter.as_secs_f64());
        exponential + Duration::from_secs_f64(jitter_secs)
    }

    /// Run `op` under this policy. `op` receives the zero-based attempt
    /// number. `on_wait` fires before each backoff sleep so callers can
    /// surface progress; it must not block.
    pub fn execute<T, O, W>(&self, mut op: O, mut on_wait: W) -> LoomResult<T>
    where
        O: FnMut(u32) -> LoomResult<T>,
        W: FnMut(RetryContext),
    {
        let mut last_error: Option<LoomError> = None;
        for attempt in 0..self.max_attempts.max(1) {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if error.class() != ErrorClass::Transient {
                        return Err(error);
                    }
                    tracing::warn!(attempt, %error, "transient failure");
                    last_error = Some(error);
                    if attempt + 1 < self.max_attempts {
                        let wait = self.delay_for(attempt);
                        on_wait(RetryContext {
                            attempt,
                            wait_seconds: wait.as_secs_f64(),
                            phase: ProgressPhase::BackoffWait,
                        });
                        std::thread::sleep(wait);
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| LoomError::InvalidRequest("retry budget of zero".to_owned())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::BackoffPolicy;
    use crate::error::LoomError;

    #[test]
    fn transient_failures_retry_up_to_budget() {
        let policy = BackoffPolicy::immediate(3);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy.execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoomError::ProviderBusy("429".to_owned()))
            },
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn success_on_second_attempt_stops_retrying() {
        let policy = BackoffPolicy::immediate(4);
        let calls = AtomicU32::new(0);
        let result = policy.execute(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    Err(LoomError::ProviderBusy("busy".to_owned()))
                } else {
                    Ok("done")
                }
            },
            |_| {},
        );
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fatal_error_aborts_without_retry() {
        let policy = BackoffPolicy::immediate(5);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy.execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoomError::MissingCredentials("no key".to_owned()))
            },
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connectivity_error_aborts_without_retry() {
        let policy = BackoffPolicy::immediate(5);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy.execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoomError::ProviderUnreachable("refused".to_owned()))
            },
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_wait_fires_between_attempts_with_context() {
        let policy = BackoffPolicy::immediate(3);
        let mut waits = Vec::new();
        let _: Result<(), _> = policy.execute(
            |_| Err(LoomError::ProviderBusy("busy".to_owned())),
            |ctx| waits.push(ctx.attempt),
        );
        // Two sleeps for three attempts.
        assert_eq!(waits, vec![0, 1]);
    }

    #[test]
    fn delay_doubles_per_attempt_without_jitter() {
        let policy = BackoffPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = BackoffPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_jitter: Duration::from_millis(50),
        };
        for _ in 0..32 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(60));
        }
    }
}
