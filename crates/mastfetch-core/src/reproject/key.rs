//! Cache fingerprints.
//!
//! SHA-256 over a canonical JSON payload of sorted channel path lists plus
//! the input pixel budget. The RGB and N-channel constructors serialize
//! different shapes, so requests of different modes with identical paths
//! can never collide.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Opaque cache key (lowercase hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

#[derive(Serialize)]
struct RgbPayload {
    red: Vec<String>,
    green: Vec<String>,
    blue: Vec<String>,
    budget: u64,
}

#[derive(Serialize)]
struct NChannelPayload {
    channels: Vec<Vec<String>>,
    budget: u64,
}

/// Key for an ordered R/G/B composite request.
pub fn key_rgb(red: &[String], green: &[String], blue: &[String], input_budget: u64) -> CacheKey {
    digest(&RgbPayload {
        red: sorted(red),
        green: sorted(green),
        blue: sorted(blue),
        budget: input_budget,
    })
}

/// Key for a labeled N-channel composite request.
pub fn key_nchannel(channel_paths: &[Vec<String>], input_budget: u64) -> CacheKey {
    digest(&NChannelPayload {
        channels: channel_paths.iter().map(|paths| sorted(paths)).collect(),
        budget: input_budget,
    })
}

fn sorted(paths: &[String]) -> Vec<String> {
    let mut out = paths.to_vec();
    out.sort();
    out
}

fn digest<T: Serialize>(payload: &T) -> CacheKey {
    let json = serde_json::to_string(payload).expect("payload serialization is infallible");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}
