//! Job runner tasks: drive one engine run per job and reconcile the
//! job-level status afterwards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use mastfetch_core::engine::ProgressSink;
use mastfetch_core::job::{FileSpec, JobState, JobStatus, RemoteLocator};
use mastfetch_core::registry::{JobRegistry, ResumeTicket};
use mastfetch_core::resolver::{resolve_s3_key, Product};

use super::error::ApiError;
use super::models::ProductInput;
use super::state::SharedState;

/// Progress sink that journals every (throttled) publication, so the
/// durable state trails the live one by at most one interval.
pub fn journaling_sink(registry: &Arc<JobRegistry>) -> Arc<ProgressSink> {
    let journal = Arc::clone(registry.journal());
    Arc::new(ProgressSink::new(move |job| {
        if let Err(e) = journal.save(job) {
            tracing::warn!(job_id = %job.job_id, error = %e, "journal save failed");
        }
    }))
}

/// Manifest entries from an inline product list.
pub fn specs_from_inline(products: &[ProductInput], source_id: &str) -> Vec<FileSpec> {
    products
        .iter()
        .filter_map(|p| {
            let locator = if let Some(url) = &p.url {
                RemoteLocator::Http(url.clone())
            } else if let Some(key) = &p.s3_key {
                RemoteLocator::S3(key.clone())
            } else {
                RemoteLocator::S3(resolve_s3_key(&p.filename, Some(source_id), None)?)
            };
            Some(FileSpec {
                locator,
                filename: p.filename.clone(),
                expected_size: p.size,
            })
        })
        .collect()
}

/// Manifest entries from archive-service products. Products without a URL
/// fall back to the public mirror bucket; unresolvable ones are dropped.
pub fn specs_from_products(products: &[Product], source_id: &str) -> Vec<FileSpec> {
    products
        .iter()
        .filter_map(|p| {
            let locator = if let Some(url) = &p.url {
                RemoteLocator::Http(url.clone())
            } else {
                let key = resolve_s3_key(
                    &p.filename,
                    p.source_id.as_deref().or(Some(source_id)),
                    p.program_id.as_deref(),
                )?;
                RemoteLocator::S3(key)
            };
            Some(FileSpec {
                locator,
                filename: p.filename.clone(),
                expected_size: p.size,
            })
        })
        .collect()
}

/// Spawn the full lifecycle of a freshly created job: manifest resolution,
/// engine run, final transitions. Failures land in the job state.
pub fn spawn_start(
    state: SharedState,
    job_id: String,
    source_id: String,
    product_type: Option<String>,
    inline: Option<Vec<ProductInput>>,
) {
    tokio::spawn(async move {
        if let Err(err) = drive_new_job(&state, &job_id, &source_id, product_type, inline).await {
            tracing::error!(job_id, error = %err, "download job failed");
            let _ = state.registry.transition(&job_id, JobStatus::Failed, |job| {
                job.error = Some(format!("{err:#}"));
            });
        }
    });
}

async fn drive_new_job(
    state: &SharedState,
    job_id: &str,
    source_id: &str,
    product_type: Option<String>,
    inline: Option<Vec<ProductInput>>,
) -> Result<()> {
    state
        .registry
        .transition(job_id, JobStatus::FetchingManifest, |_| {})?;

    let specs = match inline {
        Some(products) => specs_from_inline(&products, source_id),
        None => {
            let products = state
                .products
                .products_for(source_id, product_type.as_deref())
                .await?;
            specs_from_products(&products, source_id)
        }
    };
    if specs.is_empty() {
        anyhow::bail!("no downloadable products for {source_id}");
    }

    run_engine(state, job_id, &specs).await
}

/// Resume a job. In-process paused runs just reopen the gate; otherwise
/// the job is rematerialized from the journal under the resume guard.
/// Returns whether this was an in-process resume.
pub async fn resume(state: &SharedState, job_id: &str) -> Result<bool, ApiError> {
    if let Some(job) = state.registry.get(job_id) {
        let status = job.lock().unwrap().status;
        if status == JobStatus::Paused {
            if let Some(control) = state.registry.control(job_id) {
                if control.is_paused() && !control.is_cancelled() {
                    state
                        .registry
                        .transition(job_id, JobStatus::Downloading, |_| {})?;
                    control.resume();
                    return Ok(true);
                }
            }
        }
    }

    // Claim the resume slot before touching the journal; a concurrent
    // resume for the same job must see a conflict, not a second run.
    let ticket = state
        .resume_guard
        .acquire(job_id)
        .ok_or_else(|| ApiError::Conflict(format!("job {job_id} is already being resumed")))?;

    let Some(mut job_state) = state.registry.journal().load(job_id) else {
        return Err(ApiError::NotFound(format!("job not found: {job_id}")));
    };
    if !job_state.is_resumable() {
        return Err(ApiError::Validation(format!(
            "job {job_id} is not resumable from state {}",
            job_state.status
        )));
    }
    // A job journaled as `downloading` is crash evidence; treat it as
    // paused so the downloading transition below is legal.
    if job_state.status == JobStatus::Downloading {
        job_state.status = JobStatus::Paused;
    }

    spawn_resumed_run(state, job_state, ticket)?;
    Ok(false)
}

fn spawn_resumed_run(
    state: &SharedState,
    job_state: JobState,
    ticket: ResumeTicket,
) -> Result<(), ApiError> {
    let job_id = job_state.job_id.clone();
    state.registry.insert_resumed(job_state);
    state
        .registry
        .transition(&job_id, JobStatus::Downloading, |_| {})?;

    let state = Arc::clone(state);
    tokio::spawn(async move {
        // Held for the duration of the run; dropped on every exit path.
        let _ticket = ticket;
        if let Err(err) = run_engine(&state, &job_id, &[]).await {
            tracing::error!(job_id, error = %err, "resumed job failed");
            let _ = state.registry.transition(&job_id, JobStatus::Failed, |job| {
                job.error = Some(format!("{err:#}"));
            });
        }
    });
    Ok(())
}

async fn run_engine(state: &SharedState, job_id: &str, specs: &[FileSpec]) -> Result<()> {
    let registry = &state.registry;
    let job = registry
        .get(job_id)
        .ok_or_else(|| anyhow::anyhow!("job evicted before run: {job_id}"))?;
    let control = registry
        .control(job_id)
        .ok_or_else(|| anyhow::anyhow!("job has no control: {job_id}"))?;
    let speed = registry
        .speed(job_id)
        .ok_or_else(|| anyhow::anyhow!("job has no speed tracker: {job_id}"))?;
    let sink = journaling_sink(registry);
    let target = job.lock().unwrap().target_dir.clone();

    let final_state = state
        .engine
        .download(specs, &target, job, Arc::clone(&control), speed, sink)
        .await;
    tracing::info!(
        job_id,
        status = %final_state.status,
        downloaded = final_state.downloaded_bytes,
        "engine run finished"
    );

    if control.is_cancelled() {
        // The engine leaves interrupted files paused; the job-level
        // cancelled state is the control plane's call.
        let _ = registry.transition(job_id, JobStatus::Cancelled, |_| {});
        let wants_cleanup = state.cancel_cleanup.lock().unwrap().remove(job_id);
        if wants_cleanup {
            cleanup_job_files(registry, job_id);
        }
    }

    let retention = Duration::from_secs(state.config.state_retention_days * 24 * 60 * 60);
    registry.journal().cleanup_completed(retention);
    registry.prune_completed();
    Ok(())
}

/// Remove partial and final files for a cancelled job.
fn cleanup_job_files(registry: &Arc<JobRegistry>, job_id: &str) {
    let Some(job) = registry.get(job_id) else {
        return;
    };
    let files = job.lock().unwrap().files.clone();
    let mut removed = 0usize;
    for file in &files {
        if std::fs::remove_file(file.part_path()).is_ok() {
            removed += 1;
        }
        if std::fs::remove_file(&file.local_path).is_ok() {
            removed += 1;
        }
    }
    tracing::info!(job_id, removed, "removed files for cancelled job");
}
