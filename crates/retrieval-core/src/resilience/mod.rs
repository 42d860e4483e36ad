//! The resilience envelope (§4.9): bulkhead, circuit breaker, timeout, and
//! retry composed around every external LLM call made during ingestion,
//! plus a graceful-degradation wrapper for operations with a sensible
//! fallback.
//!
//! Composition, outermost to innermost, per §4.9: Bulkhead admits the
//! call or rejects on capacity; the Circuit Breaker fast-fails while
//! open; then a Retry loop wraps each attempt in a Timeout (resolving an
//! ambiguity in the spec's prose ordering — see DESIGN.md — retry must
//! enclose timeout, not the reverse, or a single slow attempt could never
//! be retried).

pub mod bulkhead;
pub mod circuit_breaker;
pub mod envelope;
pub mod metrics;
pub mod retry;
pub mod timeout;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use envelope::ResilienceEnvelope;
pub use metrics::{ResilienceEvent, ResilienceMetricsSink, TracingMetricsSink};
