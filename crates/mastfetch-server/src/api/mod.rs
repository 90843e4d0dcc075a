//! Control-plane HTTP API.
//!
//! A thin surface over the job registry and download engine: every handler
//! validates fast, maps registry errors onto statuses, and leaves the heavy
//! lifting to spawned runner tasks.

mod error;
mod models;
mod routes;
mod runner;
mod state;


pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
