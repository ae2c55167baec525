//! Retry loop: drive an async operation until success or the policy stops.

use super::classify;
use super::error::FetchError;
use super::policy::{RetryDecision, RetryPolicy};
use std::future::Future;

/// Runs `op` until it succeeds or the policy says stop. On a retryable
/// failure, sleeps for the backoff delay and tries again. `op` is called
/// once per attempt and must produce a fresh future each time (clone the
/// client/URL into it).
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "transient fetch failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
