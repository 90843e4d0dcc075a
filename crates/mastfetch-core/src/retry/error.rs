//! Transfer error type for retry classification.

/// Error raised by a single file transfer (HTTP request, S3 request, or
/// local storage write). Classified before deciding whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The HTTP client reported an error (timeout, connection, body read).
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// HTTP response carried a non-success status the client did not reject.
    #[error("HTTP {0}")]
    Status(u16),
    /// Stream ended before the advertised size with no forward progress
    /// (e.g. server closed early). Retryable, so a flaky origin cannot
    /// silently truncate a file.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// S3 request failed; the message carries the SDK error chain.
    #[error("s3: {message}")]
    S3 { message: String, retryable: bool },
    /// Disk write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    /// Cooperative cancellation observed at a gate. Never retried.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}
