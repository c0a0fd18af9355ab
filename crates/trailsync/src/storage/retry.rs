//! Per-attempt timeout and fixed-delay retry for database calls.

use std::future::Future;
use std::time::Duration;

use trailsync_core::storage::{RepositoryError, Result};

/// How often and how long to try a database call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub timeout: Duration,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(5),
            delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// One attempt, used where a failure should surface immediately.
    pub fn once(timeout: Duration) -> Self {
        Self {
            attempts: 1,
            timeout,
            delay: Duration::ZERO,
        }
    }
}

/// Runs `f` until it succeeds or the attempts run out.
///
/// Every error is retried the same way; the last one is returned. A timed
/// out attempt becomes [`RepositoryError::Timeout`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &'static str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => RepositoryError::Timeout(policy.timeout.as_millis() as u64),
        };

        if attempt >= attempts {
            tracing::error!(op, attempt, error = %error, "database call failed");
            return Err(error);
        }

        tracing::warn!(op, attempt, error = %error, "database call failed, retrying");
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            timeout: Duration::from_millis(50),
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = &AtomicU32::new(0);
        let value = with_retry(&policy(3), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RepositoryError>(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = &AtomicU32::new(0);
        let value = with_retry(&policy(3), "test", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(RepositoryError::ConnectionFailed("down".to_string()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let calls = &AtomicU32::new(0);
        let err = with_retry(&policy(2), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RepositoryError::QueryFailed("boom".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(err, RepositoryError::QueryFailed("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn every_error_class_is_retried() {
        let calls = &AtomicU32::new(0);
        let _ = with_retry(&policy(3), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RepositoryError::InvalidData("bad".to_string()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let err = with_retry(&policy(1), "test", || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RepositoryError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err, RepositoryError::Timeout(50));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = &AtomicU32::new(0);
        let _ = with_retry(&policy(0), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RepositoryError>(())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
