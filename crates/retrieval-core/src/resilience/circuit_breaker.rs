//! Circuit breaker (§4.9 stage 2): Closed / Open / Half-Open state
//! machine, one instance per named external operation. Opens after
//! `failure_threshold` consecutive failures; short-circuits for
//! `cooldown` while open; admits limited probes in Half-Open, closing on
//! `success_threshold` consecutive probe successes or reopening on any
//! probe failure.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::metrics::{ResilienceEvent, ResilienceMetricsSink};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    operation: &'static str,
    failure_threshold: u32,
    success_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(operation: &'static str, failure_threshold: u32, success_threshold: u32, cooldown: Duration) -> Self {
        Self {
            operation,
            failure_threshold,
            success_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Call before attempting the guarded operation. Transitions Open ->
    /// Half-Open once the cooldown elapses; otherwise short-circuits
    /// while Open.
    pub fn before_call(&self, sink: &dyn ResilienceMetricsSink) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    self.transition(&mut inner, CircuitState::HalfOpen, sink);
                    Ok(())
                } else {
                    sink.record(ResilienceEvent::CircuitShortCircuited { operation: self.operation });
                    Err(EngineError::ResCircuitOpen(self.operation.to_string()))
                }
            }
        }
    }

    pub fn on_success(&self, sink: &dyn ResilienceMetricsSink) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed, sink);
                }
            }
            CircuitState::Open => {
                // A success while Open shouldn't normally happen (before_call
                // would have short-circuited), but close defensively.
                self.transition(&mut inner, CircuitState::Closed, sink);
            }
        }
    }

    pub fn on_failure(&self, sink: &dyn ResilienceMetricsSink) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open, sink);
                }
            }
            CircuitState::HalfOpen => {
                // Any probe failure reopens immediately (§4.9).
                self.transition(&mut inner, CircuitState::Open, sink);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, sink: &dyn ResilienceMetricsSink) {
        let from = inner.state;
        inner.state = to;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        if to == CircuitState::Open {
            inner.opened_at = Some(Instant::now());
        }
        if from != to {
            sink.record(ResilienceEvent::CircuitStateChanged {
                operation: self.operation,
                from: from.label(),
                to: to.label(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::metrics::SilentMetricsSink;
    use std::time::Duration;

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let cb = CircuitBreaker::new("llm", 3, 2, Duration::from_secs(60));
        let sink = SilentMetricsSink;
        for _ in 0..2 {
            cb.before_call(&sink).unwrap();
            cb.on_failure(&sink);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.before_call(&sink).unwrap();
        cb.on_failure(&sink);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn short_circuits_while_open() {
        let cb = CircuitBreaker::new("llm", 1, 1, Duration::from_secs(60));
        let sink = SilentMetricsSink;
        cb.before_call(&sink).unwrap();
        cb.on_failure(&sink);
        assert_eq!(cb.state(), CircuitState::Open);
        let err = cb.before_call(&sink).unwrap_err();
        assert_eq!(err.code(), "RES_CIRCUIT_OPEN");
    }

    #[test]
    fn half_open_closes_after_success_threshold_probes() {
        let cb = CircuitBreaker::new("llm", 1, 2, Duration::from_millis(10));
        let sink = SilentMetricsSink;
        cb.before_call(&sink).unwrap();
        cb.on_failure(&sink);
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        cb.before_call(&sink).unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_success(&sink);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.before_call(&sink).unwrap();
        cb.on_success(&sink);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("llm", 1, 2, Duration::from_millis(10));
        let sink = SilentMetricsSink;
        cb.before_call(&sink).unwrap();
        cb.on_failure(&sink);
        std::thread::sleep(Duration::from_millis(20));
        cb.before_call(&sink).unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_failure(&sink);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    /// S6 from §8: 7 injected failures, defaults (threshold 5, cooldown,
    /// success-threshold 2) — failures 1-5 propagate as real failures,
    /// 6-7 are short-circuited, then recovery after cooldown.
    #[test]
    fn s6_circuit_opens_then_recovers() {
        let cb = CircuitBreaker::new("llm", 5, 2, Duration::from_millis(10));
        let sink = SilentMetricsSink;

        let mut short_circuited = 0;
        for i in 0..7 {
            match cb.before_call(&sink) {
                Ok(()) => cb.on_failure(&sink),
                Err(_) => short_circuited += 1,
            }
            if i == 3 {
                assert_eq!(cb.state(), CircuitState::Closed);
            }
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(short_circuited, 2);

        std::thread::sleep(Duration::from_millis(20));
        cb.before_call(&sink).unwrap();
        cb.on_success(&sink);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.before_call(&sink).unwrap();
        cb.on_success(&sink);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
