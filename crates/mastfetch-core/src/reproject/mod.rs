//! Bounded cache for reprojected channel planes.
//!
//! Memoizes the expensive load -> downscale -> reproject pipeline so
//! stretch-only parameter changes skip it entirely. Purely in-memory; the
//! cache does not survive a restart.

mod cache;
mod key;
mod plane;

pub use cache::ReprojCache;
pub use key::{key_nchannel, key_rgb, CacheKey};
pub use plane::ChannelPlane;
