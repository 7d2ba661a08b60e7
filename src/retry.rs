use crate::config::RetryConfig;
use crate::error::{Disposition, IngestError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub type Classifier = fn(&IngestError) -> Disposition;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub classify: Classifier,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let micros = self.base_delay.as_micros() as f64 * factor;
        let capped = micros.min(self.max_delay.as_micros() as f64);
        Duration::from_micros(capped.round() as u64)
    }

    /// Run `op` once; no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            classify: IngestError::disposition,
        }
    }
}

/// Per-job retry bookkeeping. Lives on the worker's stack for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

#[derive(Clone)]
pub struct Retry {
    policy: RetryPolicy,
    sleep: fn(Duration),
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleep: thread::sleep,
        }
    }

    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn run<T, F>(&self, op: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Result<T, IngestError>,
    {
        self.run_tracked(&mut RetryState::default(), op)
    }

    /// Run `op` until it succeeds, fails terminally, or `max_attempts` is used up.
    ///
    /// A terminal error comes back unchanged; running out of attempts on a
    /// retryable one comes back as `ExhaustedRetry` wrapping the last error.
    pub fn run_tracked<T, F>(&self, state: &mut RetryState, mut op: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Result<T, IngestError>,
    {
        loop {
            state.attempts += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if (self.policy.classify)(&err) == Disposition::Terminal {
                return Err(err);
            }
            if state.attempts >= self.policy.max_attempts {
                warn!("Giving up after {} attempts: {}", state.attempts, err);
                return Err(IngestError::ExhaustedRetry {
                    attempts: state.attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_for(state.attempts);
            debug!(
                "Attempt {} failed ({}), retrying in {:?}",
                state.attempts, err, delay
            );
            state.delays.push(delay);
            (self.sleep)(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::Path;

    fn no_sleep(_: Duration) {}

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(50),
            classify: IngestError::disposition,
        }
    }

    fn transient() -> IngestError {
        IngestError::io(
            Path::new("/export/posts_1.json"),
            &std::io::Error::new(std::io::ErrorKind::WouldBlock, "locked"),
        )
    }

    #[test]
    fn test_exhaustion_after_max_attempts_with_exponential_schedule() {
        let calls = Cell::new(0);
        let mut state = RetryState::default();
        let retry = Retry::new(policy(5)).with_sleep(no_sleep);

        let result: Result<(), _> = retry.run_tracked(&mut state, || {
            calls.set(calls.get() + 1);
            Err(transient())
        });

        assert_eq!(calls.get(), 5);
        assert_eq!(state.attempts, 5);
        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        match err {
            IngestError::ExhaustedRetry { attempts, last } => {
                assert_eq!(attempts, 5);
                assert!(matches!(*last, IngestError::TransientIo { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        let ms: Vec<u128> = state.delays.iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![10, 20, 40, 50]);
    }

    #[test]
    fn test_terminal_error_is_not_retried() {
        let calls = Cell::new(0);
        let retry = Retry::new(policy(5)).with_sleep(no_sleep);
        let result: Result<(), _> = retry.run(|| {
            calls.set(calls.get() + 1);
            Err(IngestError::malformed("bad"))
        });
        assert_eq!(calls.get(), 1);
        let err = result.unwrap_err();
        assert!(!err.is_exhausted());
    }

    #[test]
    fn test_recovers_after_transient_failures() {
        let calls = Cell::new(0);
        let mut state = RetryState::default();
        let retry = Retry::new(policy(3)).with_sleep(no_sleep);
        let value = retry
            .run_tracked(&mut state, || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(state.attempts, 3);
        assert_eq!(state.delays.len(), 2);
    }

    #[test]
    fn test_custom_classifier() {
        fn everything_terminal(_: &IngestError) -> Disposition {
            Disposition::Terminal
        }
        let mut p = policy(4);
        p.classify = everything_terminal;
        let calls = Cell::new(0);
        let result: Result<(), _> = Retry::new(p).with_sleep(no_sleep).run(|| {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(IngestError::TransientIo { .. })));
    }
}
