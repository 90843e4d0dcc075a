//! Request and response bodies for the control plane.

use serde::{Deserialize, Serialize};

use mastfetch_core::journal::ResumableJobSummary;

/// Start (or resume) a download for a source identifier.
///
/// `products` inlines the manifest and skips the archive query service;
/// without it the configured product source is consulted.
#[derive(Debug, Deserialize)]
pub struct StartDownloadRequest {
    pub source_id: String,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub resume_job_id: Option<String>,
    #[serde(default)]
    pub products: Option<Vec<ProductInput>>,
}

/// One inline product: either a direct URL or an S3 key (resolved from the
/// filename when absent).
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartDownloadResponse {
    pub job_id: String,
    pub is_resume: bool,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct JobActionResponse {
    pub job_id: String,
    pub status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub delete_files: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DismissQuery {
    #[serde(default)]
    pub delete_files: bool,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub job_id: String,
    pub deleted_files: usize,
}

#[derive(Debug, Serialize)]
pub struct ResumableJobsResponse {
    pub jobs: Vec<ResumableJobSummary>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileUrlQuery {
    /// Presigned URL lifetime in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u64,
}

fn default_ttl() -> u64 {
    900
}

#[derive(Debug, Serialize)]
pub struct FileUrlResponse {
    pub key: String,
    /// `None` when the backend has no presigning (local storage).
    pub url: Option<String>,
}

/// Safe source identifier: `[A-Za-z0-9._-]+`.
pub fn validate_source_id(source_id: &str) -> bool {
    !source_id.is_empty()
        && source_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}
