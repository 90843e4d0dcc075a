use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use mastfetch_core::config::Config;
use mastfetch_core::engine::DownloadEngine;
use mastfetch_core::journal::StateJournal;
use mastfetch_core::logging;
use mastfetch_core::registry::{JobRegistry, ResumeGuard};
use mastfetch_core::storage::make_provider;

mod api;
mod products;

/// Control-plane server for the mastfetch archive ingestion service.
#[derive(Debug, Parser)]
#[command(name = "mastfetchd")]
#[command(about = "mastfetch: resumable archive ingestion service", long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8600", value_name = "ADDR")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    if let Err(err) = run(Args::parse()).await {
        eprintln!("mastfetchd error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::from_env();

    let journal = Arc::new(StateJournal::open(&config.download_root)?);
    // Startup housekeeping: drop expired terminal entries and stale parts.
    let retention = Duration::from_secs(config.state_retention_days * 24 * 60 * 60);
    journal.cleanup_completed(retention);
    journal.cleanup_orphaned_parts(retention);

    let registry = Arc::new(JobRegistry::new(
        Arc::clone(&journal),
        Duration::from_secs(config.completed_job_in_memory_minutes * 60),
    ));
    let engine = Arc::new(DownloadEngine::new(&config).await?);
    let storage = make_provider(&config).await?;
    let product_source = products::from_config(&config);

    let state = Arc::new(api::AppState {
        config,
        registry,
        engine,
        storage,
        resume_guard: ResumeGuard::new(),
        products: product_source,
        cancel_cleanup: Default::default(),
    });

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, "mastfetchd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
