//! In-memory job registry and the concurrent-resume guard.
//!
//! The registry assigns job identifiers, owns live job state, validates
//! status transitions (journaling each one), and rematerializes read-only
//! snapshots from the journal for jobs no longer resident.

mod guard;
mod tracker;

pub use guard::{ResumeGuard, ResumeTicket};
pub use tracker::{JobRegistry, RegistryError};
