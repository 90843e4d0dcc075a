//! Classify HTTP statuses and client errors into retry policy error kinds.

use super::error::TransferError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        416 => ErrorKind::RangeNotSatisfiable,
        500..=599 => ErrorKind::Http5xx(code),
        400..=499 => ErrorKind::PermanentHttp(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a reqwest error for retry decisions.
pub fn classify_reqwest_error(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        return ErrorKind::Timeout;
    }
    if e.is_connect() {
        return ErrorKind::Connection;
    }
    if let Some(status) = e.status() {
        return classify_http_status(status.as_u16());
    }
    // Body/decode errors mid-stream behave like a dropped connection: the
    // next attempt resumes from the confirmed offset.
    if e.is_body() || e.is_decode() || e.is_request() {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a transfer error into an ErrorKind.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Http(re) => classify_reqwest_error(re),
        TransferError::Status(code) => classify_http_status(*code),
        TransferError::S3 { retryable, .. } => {
            if *retryable {
                ErrorKind::Connection
            } else {
                ErrorKind::Other
            }
        }
        TransferError::PartialTransfer { .. } => ErrorKind::Connection,
        TransferError::Storage(_) | TransferError::Cancelled => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_permanent_except_416() {
        assert!(matches!(classify_http_status(404), ErrorKind::PermanentHttp(404)));
        assert!(matches!(classify_http_status(403), ErrorKind::PermanentHttp(403)));
        assert_eq!(classify_http_status(416), ErrorKind::RangeNotSatisfiable);
    }

    #[test]
    fn storage_and_cancel_not_retried() {
        let io = TransferError::Storage(std::io::Error::other("disk full"));
        assert_eq!(classify(&io), ErrorKind::Other);
        assert_eq!(classify(&TransferError::Cancelled), ErrorKind::Other);
    }

    #[test]
    fn s3_retryable_flag_drives_kind() {
        let transient = TransferError::S3 {
            message: "dispatch failure".into(),
            retryable: true,
        };
        let permanent = TransferError::S3 {
            message: "NoSuchKey".into(),
            retryable: false,
        };
        assert_eq!(classify(&transient), ErrorKind::Connection);
        assert_eq!(classify(&permanent), ErrorKind::Other);
    }
}
