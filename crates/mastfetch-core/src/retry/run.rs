//! Retry loop: run an async operation until success or policy says stop.

use std::future::Future;

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs an async operation until it succeeds or the retry policy says to
/// stop. On retryable failure, sleeps for the backoff duration then tries
/// again. Cancellation is never retried.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(
                            attempt,
                            max = policy.max_retries,
                            delay_ms = d.as_millis() as u64,
                            error = %e,
                            "transfer error, retrying after backoff"
                        );
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
