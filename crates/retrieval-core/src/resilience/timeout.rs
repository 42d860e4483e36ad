//! Timeout (§4.9 innermost stage): bounds a single attempt's wall-clock
//! time, mapping `tokio::time::timeout`'s `Elapsed` into a domain error
//! the retry layer can inspect via `is_retryable()`.

use std::future::Future;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Run `fut` with a deadline of `duration`. A timed-out attempt is
/// reported as `EngineError::ResTimeout`, which `is_retryable()` treats
/// as retryable so the outer retry loop can try again.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(EngineError::ResTimeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_under_deadline() {
        let result = with_timeout(Duration::from_millis(50), async { Ok::<_, EngineError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn times_out_when_future_outlasts_deadline() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, EngineError>(42)
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), "RES_TIMEOUT");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn inner_error_passes_through_unchanged() {
        let result = with_timeout(Duration::from_millis(50), async {
            Err::<i32, _>(EngineError::Configuration("bad".into()))
        })
        .await;
        assert_eq!(result.unwrap_err().code(), "CFG_INVALID");
    }
}
