//! Job and file-entry data model.
//!
//! A job is one request to materialize a set of remote blobs under a
//! source-identifier prefix. The registry owns these objects while a job is
//! live; the journal owns their durable projection.

mod snapshot;
mod state;
mod status;

pub use snapshot::{FileSnapshot, JobSnapshot};
pub use state::{target_dir_for, FileEntry, FileSpec, JobState, RemoteLocator};
pub use status::{FileStatus, JobStatus};

/// A live job shared between the registry and one engine run. Lock scope is
/// always a short synchronous section; nothing awaits while holding it.
pub type SharedJob = std::sync::Arc<std::sync::Mutex<JobState>>;
