//! Dense pixel plane for one composite channel.

use std::sync::Arc;

/// One reprojected channel: a labeled dense f32 grid on the common pixel
/// frame. Sample storage is shared; the cache hands the same planes to
/// every hit and callers must treat them as read-only.
#[derive(Debug, Clone)]
pub struct ChannelPlane {
    pub label: String,
    pub width: usize,
    pub height: usize,
    samples: Arc<Vec<f32>>,
}

impl ChannelPlane {
    /// Build a plane; the sample count must match the dimensions.
    pub fn new(label: impl Into<String>, width: usize, height: usize, samples: Vec<f32>) -> Option<Self> {
        if samples.len() != width * height {
            return None;
        }
        Some(Self {
            label: label.into(),
            width,
            height,
            samples: Arc::new(samples),
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Memory footprint used for cache byte accounting.
    pub fn byte_len(&self) -> u64 {
        (self.samples.len() * std::mem::size_of::<f32>()) as u64
    }
}
