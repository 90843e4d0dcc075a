//! Integration tests: engine against a local range-capable HTTP server.
//!
//! Covers the happy path, size discovery without Content-Length, retry on
//! flaky servers, mid-body connection drops, permanent per-file failures,
//! 416-as-complete, and filename sanitization end to end.

mod common;

use std::path::Path;
use std::sync::Arc;

use mastfetch_core::config::Config;
use mastfetch_core::engine::{DownloadControl, DownloadEngine, ProgressSink, SpeedTracker};
use mastfetch_core::job::{FileSpec, FileStatus, JobState, JobStatus, RemoteLocator, SharedJob};

use common::range_server::{self, RangeServerOptions};

fn test_config() -> Config {
    let mut config = Config::default();
    config.chunk_size_bytes = 64 * 1024;
    config.max_retries = 3;
    config.retry_base_seconds = 0.02;
    config.connect_timeout_s = 5;
    config.read_timeout_s = 5;
    config
}

fn body(len: usize) -> Vec<u8> {
    (0u8..=255).cycle().take(len).collect()
}

fn spec(base: &str, name: &str, size: Option<u64>) -> FileSpec {
    FileSpec {
        locator: RemoteLocator::Http(format!("{base}/{name}")),
        filename: name.to_string(),
        expected_size: size,
    }
}

fn shared_job(target: &Path) -> SharedJob {
    Arc::new(std::sync::Mutex::new(JobState::new(
        "itest0000001".into(),
        "obs1".into(),
        target.to_path_buf(),
    )))
}

async fn run(
    engine: &DownloadEngine,
    manifest: &[FileSpec],
    target: &Path,
    job: SharedJob,
) -> JobState {
    engine
        .download(
            manifest,
            target,
            job,
            Arc::new(DownloadControl::new()),
            Arc::new(SpeedTracker::default()),
            Arc::new(ProgressSink::noop()),
        )
        .await
}

#[tokio::test]
async fn happy_path_three_files_complete_with_exact_bytes() {
    let bodies = [body(100_000), body(256_000), body(515_000)];
    let base = range_server::start(vec![
        ("/a.fits", bodies[0].clone()),
        ("/b.fits", bodies[1].clone()),
        ("/c.fits", bodies[2].clone()),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![
        spec(&base, "a.fits", Some(100_000)),
        spec(&base, "b.fits", None),
        spec(&base, "c.fits", None),
    ];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Complete);
    assert_eq!(final_state.downloaded_bytes, 871_000);
    assert_eq!(final_state.total_bytes, 871_000);
    assert!(final_state.completed_at.is_some());
    for (entry, expected) in final_state.files.iter().zip(&bodies) {
        assert_eq!(entry.status, FileStatus::Complete);
        let on_disk = std::fs::read(&entry.local_path).unwrap();
        assert_eq!(&on_disk, expected, "{} content mismatch", entry.filename);
        assert!(!entry.part_path().exists(), "no partials after completion");
    }
}

#[tokio::test]
async fn zero_byte_and_exact_chunk_files_complete() {
    let chunk = 64 * 1024;
    let base = range_server::start(vec![
        ("/empty.fits", Vec::new()),
        ("/exact.fits", body(chunk)),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![
        spec(&base, "empty.fits", None),
        spec(&base, "exact.fits", None),
    ];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Complete);
    assert_eq!(std::fs::read(target.join("empty.fits")).unwrap().len(), 0);
    assert_eq!(std::fs::read(target.join("exact.fits")).unwrap().len(), chunk);
}

#[tokio::test]
async fn size_unknown_until_first_response_still_completes() {
    let payload = body(150_000);
    let base = range_server::start_with_options(
        vec![("/mystery.fits", payload.clone())],
        RangeServerOptions {
            head_allowed: false,
            advertise_length: false,
            ..Default::default()
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![spec(&base, "mystery.fits", None)];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Complete);
    assert_eq!(final_state.files[0].total_bytes, 150_000);
    assert_eq!(std::fs::read(target.join("mystery.fits")).unwrap(), payload);
}

#[tokio::test]
async fn transient_503s_are_retried_to_success() {
    let payload = body(80_000);
    let base = range_server::start_with_options(
        vec![("/flaky.fits", payload.clone())],
        RangeServerOptions {
            fail_first_requests: 2,
            ..Default::default()
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![spec(&base, "flaky.fits", Some(80_000))];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Complete);
    assert_eq!(std::fs::read(target.join("flaky.fits")).unwrap(), payload);
}

#[tokio::test]
async fn connection_drop_resumes_from_confirmed_offset() {
    let payload = body(400_000);
    let base = range_server::start_with_options(
        vec![("/drop.fits", payload.clone())],
        RangeServerOptions {
            drop_once_after: Some(50_000),
            ..Default::default()
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![spec(&base, "drop.fits", Some(400_000))];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Complete);
    // Byte-identical despite the mid-body drop: no gaps, no overlap.
    assert_eq!(std::fs::read(target.join("drop.fits")).unwrap(), payload);
}

#[tokio::test]
async fn permanent_failure_fails_file_but_not_siblings() {
    let payload = body(60_000);
    let base = range_server::start(vec![("/good.fits", payload.clone())]);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![
        spec(&base, "good.fits", Some(60_000)),
        spec(&base, "missing.fits", None),
    ];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Failed);
    assert!(final_state.is_resumable());
    assert!(final_state.error.as_deref().unwrap().contains("1 file(s)"));

    let good = final_state.file_by_name("good.fits").unwrap();
    assert_eq!(good.status, FileStatus::Complete);
    assert_eq!(std::fs::read(&good.local_path).unwrap(), payload);

    let missing = final_state.file_by_name("missing.fits").unwrap();
    assert_eq!(missing.status, FileStatus::Failed);
    assert!(missing.error.as_deref().unwrap().contains("404"));
}

#[tokio::test]
async fn resume_past_end_treats_416_as_complete() {
    let payload = body(90_000);
    // No HEAD, no Content-Length: the engine cannot learn the size up
    // front, so the pre-seeded full partial forces a ranged request that
    // the server answers with 416.
    let base = range_server::start_with_options(
        vec![("/done.fits", payload.clone())],
        RangeServerOptions {
            head_allowed: false,
            advertise_length: false,
            ..Default::default()
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("done.fits.part"), &payload).unwrap();

    let engine = DownloadEngine::new(&test_config()).await.unwrap();
    let manifest = vec![spec(&base, "done.fits", None)];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    assert_eq!(final_state.status, JobStatus::Complete);
    assert_eq!(std::fs::read(target.join("done.fits")).unwrap(), payload);
    assert!(!target.join("done.fits.part").exists());
}

#[tokio::test]
async fn traversal_names_are_confined_and_bad_names_skipped() {
    let payload = body(10_000);
    let base = range_server::start(vec![("/passwd", payload.clone())]);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("obs1");
    let engine = DownloadEngine::new(&test_config()).await.unwrap();

    let manifest = vec![
        FileSpec {
            locator: RemoteLocator::Http(format!("{base}/passwd")),
            filename: "../../etc/passwd".into(),
            expected_size: None,
        },
        FileSpec {
            locator: RemoteLocator::Http(format!("{base}/never-requested")),
            filename: "bad|file.fits".into(),
            expected_size: None,
        },
    ];
    let final_state = run(&engine, &manifest, &target, shared_job(&target)).await;

    // The traversal-laden name is reduced to its basename and lands inside
    // the target dir; the unsafe name is skipped and the job completes on
    // the remainder.
    assert_eq!(final_state.status, JobStatus::Complete);
    assert_eq!(final_state.files.len(), 1);
    let confined = target.join("passwd");
    assert!(confined.exists());
    assert!(!dir.path().join("etc/passwd").exists());
    assert_eq!(std::fs::read(confined).unwrap(), payload);
}
