/*!
 * Utility functions and helpers for ZigFlow.
 *
 * This module provides common async utilities used throughout ZigFlow.
 */
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::Error;

/// Run a future with a timeout
///
/// # Arguments
///
/// * `duration` - The timeout duration
/// * `future` - The future to run
///
/// # Returns
///
/// The result of the future, or a timeout error if the timeout is reached.
/// The future may fail with any error type that a core [`Error`] converts into.
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(E::from(Error::timeout(format!(
            "Operation timed out after {:?}",
            duration
        )))),
    }
}

/// Run a future with a timeout and retry on failure
///
/// Nothing inside ZigFlow retries on its own; this is offered to callers that
/// want a retry policy around a command.
///
/// # Arguments
///
/// * `duration` - The timeout duration for each attempt
/// * `retries` - The number of retries
/// * `future_factory` - A function that creates a new future for each retry
pub async fn with_retry<F, Fut, T, E>(
    duration: Duration,
    retries: usize,
    mut future_factory: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display + From<Error>,
{
    let mut last_error = None;
    let start = Instant::now();

    for i in 0..=retries {
        if i > 0 {
            debug!("Retry {}/{}", i, retries);
        }

        match timeout(duration, future_factory()).await {
            Ok(Ok(result)) => {
                if i > 0 {
                    debug!("Succeeded after {} retries", i);
                }
                return Ok(result);
            }
            Ok(Err(e)) => {
                warn!("Attempt {} failed: {}", i + 1, e);
                last_error = Some(e);
            }
            Err(_) => {
                warn!("Attempt {} timed out", i + 1);
                last_error = Some(E::from(Error::timeout("Operation timed out")));
            }
        }
    }

    warn!("All {} retries failed after {:?}", retries, start.elapsed());

    Err(last_error.unwrap_or_else(|| E::from(Error::other("Unknown error in retry loop"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result: Result<i32> =
            with_timeout(Duration::from_secs(1), async { Ok::<_, Error>(42) }).await;
        assert_eq!(assert_ok!(result), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result: Result<i32> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Error>(42)
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_retry_success_after_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: Result<i32> = with_retry(Duration::from_secs(1), 3, move || {
            let current = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if current < 2 {
                    Err(Error::other("Intentional failure"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(assert_ok!(result), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_with_retry_all_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: Result<i32> = with_retry(Duration::from_secs(1), 2, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::other("Intentional failure")) }
        })
        .await;

        assert_err!(result);
        assert_eq!(counter.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }
}
