//! Injected metrics sink for the resilience envelope (§4.9: "every stage
//! emits metrics ... through an injected logger interface (no globals),
//! so tests can inject a silent logger").

/// One observable event from any resilience stage. Kept as a flat enum
/// rather than per-stage structs so a single sink implementation can
/// pattern-match the subset it cares about.
#[derive(Debug, Clone)]
pub enum ResilienceEvent {
    BulkheadAccepted { operation: &'static str },
    BulkheadQueued { operation: &'static str },
    BulkheadRejected { operation: &'static str },
    CircuitStateChanged { operation: &'static str, from: &'static str, to: &'static str },
    CircuitShortCircuited { operation: &'static str },
    AttemptStarted { operation: &'static str, attempt: u32 },
    AttemptFailed { operation: &'static str, attempt: u32, retryable: bool },
    AttemptSucceeded { operation: &'static str, attempt: u32 },
    TimedOut { operation: &'static str, attempt: u32 },
    Degraded { operation: &'static str },
}

/// Sink contract: no globals, so tests inject a silent or recording
/// implementation instead of relying on process-wide logging state.
pub trait ResilienceMetricsSink: Send + Sync {
    fn record(&self, event: ResilienceEvent);
}

/// Production default: forwards every event to `tracing`, matching the
/// `tracing::warn!`/`info!` density in `rag_engine.rs`/`lance_store.rs`.
pub struct TracingMetricsSink;

impl ResilienceMetricsSink for TracingMetricsSink {
    fn record(&self, event: ResilienceEvent) {
        match event {
            ResilienceEvent::BulkheadAccepted { operation } => {
                tracing::debug!(operation, "bulkhead accepted");
            }
            ResilienceEvent::BulkheadQueued { operation } => {
                tracing::debug!(operation, "bulkhead queued");
            }
            ResilienceEvent::BulkheadRejected { operation } => {
                tracing::warn!(operation, "bulkhead rejected: at capacity");
            }
            ResilienceEvent::CircuitStateChanged { operation, from, to } => {
                tracing::info!(operation, from, to, "circuit breaker state change");
            }
            ResilienceEvent::CircuitShortCircuited { operation } => {
                tracing::warn!(operation, "circuit open: short-circuited");
            }
            ResilienceEvent::AttemptStarted { operation, attempt } => {
                tracing::debug!(operation, attempt, "attempt started");
            }
            ResilienceEvent::AttemptFailed { operation, attempt, retryable } => {
                tracing::warn!(operation, attempt, retryable, "attempt failed");
            }
            ResilienceEvent::AttemptSucceeded { operation, attempt } => {
                tracing::debug!(operation, attempt, "attempt succeeded");
            }
            ResilienceEvent::TimedOut { operation, attempt } => {
                tracing::warn!(operation, attempt, "attempt timed out");
            }
            ResilienceEvent::Degraded { operation } => {
                tracing::warn!(operation, "degraded to fallback");
            }
        }
    }
}

/// Test-only no-op sink (§4.9: "tests can inject a silent logger").
pub struct SilentMetricsSink;

impl ResilienceMetricsSink for SilentMetricsSink {
    fn record(&self, _event: ResilienceEvent) {}
}

/// Test-only recording sink for asserting on emitted events.
#[cfg(test)]
pub struct RecordingMetricsSink {
    pub events: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl ResilienceMetricsSink for RecordingMetricsSink {
    fn record(&self, event: ResilienceEvent) {
        self.events.lock().push(format!("{event:?}"));
    }
}
