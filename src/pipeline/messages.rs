//! Messages passed between the feature pipeline stages.
//!
//! Each message owns its per-frame buffers; they are dropped as soon as the
//! consuming stage is done with them.

use image::RgbImage;

use crate::tracking::{FeaturePoint, FeatureSet, FrameMatch};

/// Reader -> extractor workers.
pub struct FrameMsg {
    /// Absolute frame index (0-based, gap-free).
    pub index: usize,
    pub image: RgbImage,
}

/// Extractor workers -> reorder barrier. May arrive out of order.
pub struct FeatureMsg {
    pub index: usize,
    /// (width, height) of the source frame.
    pub frame_size: (u32, u32),
    pub features: FeatureSet,
}

/// Matcher -> association engine, strictly in frame order.
#[derive(Debug, Clone)]
pub struct TransitionMsg {
    pub index: usize,
    pub frame_size: (u32, u32),
    /// Detections of frame `index`.
    pub keypoints: Vec<FeaturePoint>,
    /// Candidates from frame `index - 1` to frame `index`; empty for frame 0.
    pub matches: Vec<FrameMatch>,
}
