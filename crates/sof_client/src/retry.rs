use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::error::{Result, SofError};

/// Transient statuses: request timeout, payload too large, rate limited,
/// server error, bad gateway, service unavailable and the CDN origin codes.
pub const RETRYABLE_STATUSES: [u16; 9] = [408, 413, 429, 500, 502, 503, 521, 522, 524];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub limit: usize,
    /// Delay before the first retry; doubled on each further one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Retries an async request while it fails with a retryable [`SofError`].
///
/// Total runs are at most `1 + policy.limit`.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, endpoint: &str, mut request: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    let mut delay = policy.backoff;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt <= policy.limit => {
                warn!(
                    endpoint,
                    attempt,
                    limit = policy.limit,
                    error = %err,
                    "transient failure, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => {
                debug!(endpoint, attempt, error = %err, "giving up");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn status(status: u16) -> SofError {
        SofError::Status {
            status,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn stops_at_the_limit() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy {
            limit: 2,
            backoff: Duration::ZERO,
        };
        let result: Result<()> = with_retry(policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status(502))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hard_failures_are_not_repeated() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_retry(RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status(404))
        })
        .await;
        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
