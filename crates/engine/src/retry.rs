//! Caller-side retry for conflicting units of work.
//!
//! The engine surfaces [`EngineError::Conflict`] and never retries by itself;
//! API layers and the CLI wrap calls with [`retry_on_conflict`].

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::{EngineError, ResultEngine};

/// Runs `operation` until it succeeds, fails with anything but a conflict, or
/// `retries` extra attempts are spent. The delay doubles after each conflict.
pub async fn retry_on_conflict<F, Fut, T>(
    retries: usize,
    backoff: Duration,
    mut operation: F,
) -> ResultEngine<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResultEngine<T>>,
{
    let mut attempt = 1;
    let mut delay = backoff;
    loop {
        match operation().await {
            Err(EngineError::Conflict(reason)) if attempt <= retries => {
                warn!(attempt, retries, %reason, "conflicting update, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            other => return other,
        }
    }
}
