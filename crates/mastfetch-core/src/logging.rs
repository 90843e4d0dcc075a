//! Logging init: env-filtered tracing to stderr, or a log file when configured.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mastfetch=debug"))
}

/// Initialize structured logging to stderr. Safe to call once at startup.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize logging to an append-only file (no ANSI escapes). Creates the
/// parent directory if needed. Returns Err when the path is unwritable so
/// the caller can fall back to `init_logging`.
pub fn init_logging_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir: {}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(file)
        .with_ansi(false)
        .init();

    tracing::info!("mastfetch logging initialized at {}", path.display());
    Ok(())
}
