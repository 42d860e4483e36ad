//! Bulkhead (§4.9 stage 1): bounded concurrency with a bounded wait
//! queue. Rejects immediately once both the concurrency slots and the
//! queue are full, rather than queueing unboundedly.
//!
//! Grounded in the bounded-concurrency shape of `agent/autonomous.rs`'s
//! retry loop, generalized from a single in-flight task into a shared
//! semaphore any number of callers contend over.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{EngineError, Result};

pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    queue_capacity: usize,
    queued: AtomicUsize,
    operation: &'static str,
}

/// Held for the lifetime of a single admitted call; releases its
/// concurrency slot on drop (including on cancellation or panic
/// unwinding), per §5 "resources held ... are released on all exit
/// paths".
pub struct BulkheadPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Bulkhead {
    pub fn new(operation: &'static str, max_concurrent: usize, queue_capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            queue_capacity,
            queued: AtomicUsize::new(0),
            operation,
        }
    }

    /// Acquire a slot, queueing (and logging) if none are immediately
    /// available. Rejects with `RES_BULKHEAD_REJECTED` if the queue is
    /// already at capacity when this call would need to wait.
    pub async fn acquire(&self) -> Result<BulkheadPermit<'_>> {
        // Fast path: slot immediately available.
        if let Ok(permit) = self.semaphore.try_acquire() {
            return Ok(BulkheadPermit { _permit: permit });
        }

        if self.queued.load(Ordering::SeqCst) >= self.queue_capacity {
            return Err(EngineError::ResBulkheadRejected(self.operation.to_string()));
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        let result = self.semaphore.acquire().await;
        self.queued.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(permit) => Ok(BulkheadPermit { _permit: permit }),
            Err(_) => Err(EngineError::Cancelled),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_up_to_max_concurrent() {
        let bulkhead = Bulkhead::new("test", 2, 1);
        let p1 = bulkhead.acquire().await.unwrap();
        let p2 = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.available_permits(), 0);
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn rejects_when_slots_and_queue_both_full() {
        let bulkhead = Arc::new(Bulkhead::new("test", 1, 0));
        let _permit = bulkhead.acquire().await.unwrap();
        let err = bulkhead.acquire().await.unwrap_err();
        assert_eq!(err.code(), "RES_BULKHEAD_REJECTED");
    }

    #[tokio::test]
    async fn releases_slot_on_drop() {
        let bulkhead = Bulkhead::new("test", 1, 1);
        {
            let _permit = bulkhead.acquire().await.unwrap();
            assert_eq!(bulkhead.available_permits(), 0);
        }
        assert_eq!(bulkhead.available_permits(), 1);
    }

    #[tokio::test]
    async fn queued_caller_is_admitted_once_a_slot_frees() {
        let bulkhead = Arc::new(Bulkhead::new("test", 1, 1));
        let permit = bulkhead.acquire().await.unwrap();

        let bh2 = bulkhead.clone();
        let waiter = tokio::spawn(async move {
            let _p = bh2.acquire().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bulkhead.queued_count(), 1);
        drop(permit);
        waiter.await.unwrap();
    }
}
