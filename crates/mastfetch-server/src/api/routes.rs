//! Route handlers for the control plane.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use mastfetch_core::job::{target_dir_for, JobStatus};
use mastfetch_core::storage::StorageError;

use super::error::ApiError;
use super::models::{
    validate_source_id, CancelRequest, DismissQuery, DismissResponse, FileUrlQuery,
    FileUrlResponse, JobActionResponse, ResumableJobsResponse, StartDownloadRequest,
    StartDownloadResponse,
};
use super::runner;
use super::state::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/downloads/start", post(start_download))
        .route("/downloads/resumable", get(list_resumable))
        .route("/downloads/{job_id}", delete(dismiss))
        .route("/downloads/{job_id}/progress", get(progress))
        .route("/downloads/{job_id}/pause", post(pause))
        .route("/downloads/{job_id}/resume", post(resume))
        .route("/downloads/{job_id}/cancel", post(cancel))
        .route("/files/{*key}", get(file_url))
        .with_state(state)
}

async fn start_download(
    State(state): State<SharedState>,
    Json(request): Json<StartDownloadRequest>,
) -> Result<Json<StartDownloadResponse>, ApiError> {
    if !validate_source_id(&request.source_id) {
        return Err(ApiError::Validation(
            "source_id contains invalid characters".into(),
        ));
    }

    if let Some(resume_job_id) = &request.resume_job_id {
        runner::resume(&state, resume_job_id).await?;
        return Ok(Json(StartDownloadResponse {
            job_id: resume_job_id.clone(),
            is_resume: true,
            status: "resuming",
        }));
    }

    let target_dir = target_dir_for(&state.config.download_root, &request.source_id);
    let (job_id, _job) = state.registry.create(&request.source_id, target_dir);
    runner::spawn_start(
        Arc::clone(&state),
        job_id.clone(),
        request.source_id,
        request.product_type,
        request.products,
    );

    Ok(Json(StartDownloadResponse {
        job_id,
        is_resume: false,
        status: "started",
    }))
}

async fn pause(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobActionResponse>, ApiError> {
    let control = state
        .registry
        .control(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("no active job: {job_id}")))?;

    state
        .registry
        .transition(&job_id, JobStatus::Paused, |_| {})?;
    control.pause();
    Ok(Json(JobActionResponse {
        job_id,
        status: "paused",
    }))
}

async fn resume(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobActionResponse>, ApiError> {
    runner::resume(&state, &job_id).await?;
    Ok(Json(JobActionResponse {
        job_id,
        status: "resuming",
    }))
}

async fn cancel(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
    Query(request): Query<CancelRequest>,
) -> Result<Json<JobActionResponse>, ApiError> {
    let control = state
        .registry
        .control(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("no active job: {job_id}")))?;

    // Transition first so an idle (pending/paused/failed) job lands in
    // cancelled even though no engine run is observing the token, and so a
    // rejected cancel leaves no cleanup marker behind.
    state
        .registry
        .transition(&job_id, JobStatus::Cancelled, |_| {})?;
    if request.delete_files {
        state.cancel_cleanup.lock().unwrap().insert(job_id.clone());
    }
    control.cancel();
    Ok(Json(JobActionResponse {
        job_id,
        status: "cancelled",
    }))
}

async fn list_resumable(State(state): State<SharedState>) -> Json<ResumableJobsResponse> {
    let jobs = state.registry.list_resumable();
    let count = jobs.len();
    Json(ResumableJobsResponse { jobs, count })
}

async fn dismiss(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
    Query(query): Query<DismissQuery>,
) -> Result<Json<DismissResponse>, ApiError> {
    let deleted_files = state.registry.dismiss(&job_id, query.delete_files)?;
    Ok(Json(DismissResponse {
        job_id,
        deleted_files,
    }))
}

async fn progress(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<mastfetch_core::job::JobSnapshot>, ApiError> {
    state
        .registry
        .snapshot(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {job_id}")))
}

/// Presigned (or absent, for local storage) download URL for a stored key.
async fn file_url(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(query): Query<FileUrlQuery>,
) -> Result<Json<FileUrlResponse>, ApiError> {
    let exists = state.storage.exists(&key).await.map_err(storage_error)?;
    if !exists {
        return Err(ApiError::NotFound(format!("no such file: {key}")));
    }
    let url = state
        .storage
        .presigned_url(&key, Duration::from_secs(query.ttl))
        .await
        .map_err(storage_error)?;
    Ok(Json(FileUrlResponse { key, url }))
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound(key) => ApiError::NotFound(format!("no such file: {key}")),
        e @ (StorageError::InvalidKey { .. } | StorageError::Unsupported(_)) => {
            ApiError::Validation(e.to_string())
        }
        other => ApiError::Internal(other.into()),
    }
}
