//! Retry (§4.9 stage 3): exponential backoff with jitter around each
//! timeout-wrapped attempt. Only `EngineError::is_retryable()` errors are
//! retried; everything else propagates on the first attempt.
//!
//! Grounded in `agent/autonomous.rs`'s `2^retry_count`-second backoff
//! loop, generalized to use the `backoff` crate's jittered exponential
//! schedule instead of a bare power-of-two sleep.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use super::metrics::{ResilienceEvent, ResilienceMetricsSink};
use crate::error::Result;

pub struct RetryPolicy {
    pub operation: &'static str,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(operation: &'static str, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            operation,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_delay,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Run `attempt` up to `max_attempts` times. `attempt` is handed the
    /// 1-based attempt number so callers can pass it through to an inner
    /// timeout or logging call.
    pub async fn run<F, Fut, T>(&self, sink: &dyn ResilienceMetricsSink, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut schedule = self.schedule();
        let mut last_err = None;

        for n in 1..=self.max_attempts {
            sink.record(ResilienceEvent::AttemptStarted {
                operation: self.operation,
                attempt: n,
            });
            match attempt(n).await {
                Ok(value) => {
                    sink.record(ResilienceEvent::AttemptSucceeded {
                        operation: self.operation,
                        attempt: n,
                    });
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    sink.record(ResilienceEvent::AttemptFailed {
                        operation: self.operation,
                        attempt: n,
                        retryable,
                    });
                    if !retryable || n == self.max_attempts {
                        return Err(err);
                    }
                    last_err = Some(err);
                    if let Some(delay) = schedule.next_backoff() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        // Unreachable in practice: the loop above always returns on the
        // final attempt, but keeps the compiler happy about the fallthrough.
        Err(last_err.expect("at least one attempt was made"))
    }
}
