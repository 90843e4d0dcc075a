//! API error taxonomy and its mapping onto HTTP statuses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use mastfetch_core::registry::RegistryError;

#[derive(Debug)]
pub enum ApiError {
    /// Bad identifiers, illegal state transitions, malformed input: 400.
    Validation(String),
    /// Unknown job or storage key: 404.
    NotFound(String),
    /// Concurrent resume of the same job: 409.
    Conflict(String),
    /// Everything the client cannot fix: 500.
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            ApiError::Validation(detail) => (StatusCode::BAD_REQUEST, "validation", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "conflict", detail),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    format!("{err:#}"),
                )
            }
        };
        (status, Json(ErrorBody { error, detail })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(job_id) => ApiError::NotFound(format!("job not found: {job_id}")),
            RegistryError::IllegalTransition { .. } | RegistryError::NotResumable(_) => {
                ApiError::Validation(err.to_string())
            }
            RegistryError::ResumeConflict(job_id) => {
                ApiError::Conflict(format!("job {job_id} is already being resumed"))
            }
            RegistryError::Other(inner) => ApiError::Internal(inner),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}
