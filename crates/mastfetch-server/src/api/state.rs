//! Shared server state handed to every handler.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use mastfetch_core::config::Config;
use mastfetch_core::engine::DownloadEngine;
use mastfetch_core::registry::{JobRegistry, ResumeGuard};
use mastfetch_core::storage::StorageProvider;

use crate::products::ProductSource;

pub struct AppState {
    pub config: Config,
    pub registry: Arc<JobRegistry>,
    pub engine: Arc<DownloadEngine>,
    pub storage: Arc<dyn StorageProvider>,
    pub resume_guard: Arc<ResumeGuard>,
    pub products: Arc<dyn ProductSource>,
    /// Jobs whose partial files should be removed once their cancelled run
    /// finishes unwinding.
    pub cancel_cleanup: Mutex<HashSet<String>>,
}

pub type SharedState = Arc<AppState>;
