use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// 416 Range Not Satisfiable. Never retried; the transfer path treats
    /// a resume offset past the end as "already complete".
    RangeNotSatisfiable,
    /// Origin 4xx other than 416: the request will not succeed on retry.
    PermanentHttp(u16),
    /// Any other error (not retried).
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy: `base * 2^(attempt-1)`, capped.
///
/// `max_retries` counts retries, not attempts; a value of 3 allows four
/// requests in total. Built from `Config` at engine construction.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Compute the backoff for a given retry and error kind.
    ///
    /// `attempt` is 1-based (1 = first retry). Returns `NoRetry` once the
    /// retry budget is spent or the error is permanent.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt > self.max_retries {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Other | ErrorKind::PermanentHttp(_) | ErrorKind::RangeNotSatisfiable => {
                RetryDecision::NoRetry
            }
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_) => {
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                let raw = self.base_delay.saturating_mul(exp);
                RetryDecision::RetryAfter(raw.min(self.max_delay))
            }
        }
    }
}
