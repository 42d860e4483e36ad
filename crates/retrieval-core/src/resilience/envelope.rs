//! `ResilienceEnvelope` (§4.9): the composed guard around a single named
//! external operation (an LLM call during ingestion, an embedding-
//! provider call, a slow database round trip). Composition, outermost
//! to innermost: Bulkhead admits or rejects on capacity, the Circuit
//! Breaker fast-fails while open, then Retry wraps each attempt in a
//! Timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::bulkhead::Bulkhead;
use super::circuit_breaker::CircuitBreaker;
use super::metrics::{ResilienceEvent, ResilienceMetricsSink, TracingMetricsSink};
use super::retry::RetryPolicy;
use super::timeout::with_timeout;
use crate::error::Result;

pub struct ResilienceEnvelope {
    operation: &'static str,
    bulkhead: Bulkhead,
    circuit: CircuitBreaker,
    retry: RetryPolicy,
    timeout: Duration,
    sink: Arc<dyn ResilienceMetricsSink>,
}

impl ResilienceEnvelope {
    pub fn new(
        operation: &'static str,
        bulkhead_max_concurrent: usize,
        bulkhead_queue_capacity: usize,
        circuit_failure_threshold: u32,
        circuit_success_threshold: u32,
        circuit_cooldown: Duration,
        retry_max_attempts: u32,
        retry_base_delay: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            operation,
            bulkhead: Bulkhead::new(operation, bulkhead_max_concurrent, bulkhead_queue_capacity),
            circuit: CircuitBreaker::new(operation, circuit_failure_threshold, circuit_success_threshold, circuit_cooldown),
            retry: RetryPolicy::new(operation, retry_max_attempts, retry_base_delay),
            timeout,
            sink: Arc::new(TracingMetricsSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResilienceMetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn circuit_state(&self) -> super::circuit_breaker::CircuitState {
        self.circuit.state()
    }

    /// Run `call` through the full envelope. `call` is re-invoked per
    /// retry attempt (1-based attempt number) and must itself be
    /// re-executable (no partial side effects that would double-apply).
    pub async fn run<F, Fut, T>(&self, call: F) -> Result<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let sink = self.sink.as_ref();
        let _permit = self.bulkhead.acquire().await?;
        self.circuit.before_call(sink)?;

        let result = self
            .retry
            .run(sink, |attempt| with_timeout(self.timeout, call(attempt)))
            .await;

        match &result {
            Ok(_) => self.circuit.on_success(sink),
            Err(e) if e.code() != "RES_BULKHEAD_REJECTED" => self.circuit.on_failure(sink),
            Err(_) => {}
        }

        result
    }

    /// Run `call` through the envelope, falling back to `fallback` on
    /// any failure (including a short-circuited or bulkhead-rejected
    /// call) rather than propagating the error, per §4.9's graceful-
    /// degradation note for operations with a sensible default.
    pub async fn run_or_degrade<F, Fut, T>(&self, call: F, fallback: impl FnOnce() -> T) -> T
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.run(call).await {
            Ok(value) => value,
            Err(_) => {
                self.sink.record(ResilienceEvent::Degraded { operation: self.operation });
                fallback()
            }
        }
    }
}
