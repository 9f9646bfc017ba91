//! Default feature collaborators: blob detection, BRIEF description and
//! brute-force temporal matching.
//!
//! The pipeline only sees the two traits below, so any detector or matcher
//! can be swapped in without touching the association engine.

pub mod blob;
pub mod brief;
pub mod matcher;

use anyhow::Result;
use image::RgbImage;

use crate::tracking::{FeatureSet, FrameMatch};

pub use blob::{BlobDetector, DetectorConfig};
pub use brief::BriefExtractor;
pub use matcher::{BruteForceMatcher, MatcherConfig};

/// Turns one frame into keypoints with aligned descriptors.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, frame: &RgbImage, frame_index: usize) -> Result<FeatureSet>;
}

/// Candidate correspondences from `prev` (query) to `curr` (train).
pub trait FrameMatcher: Send + Sync {
    fn match_frames(&self, prev: &FeatureSet, curr: &FeatureSet) -> Vec<FrameMatch>;
}

/// Blob centroids described with BRIEF.
pub struct BlobBriefExtractor {
    detector: BlobDetector,
    brief: BriefExtractor,
}

impl BlobBriefExtractor {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            detector: BlobDetector::new(config),
            brief: BriefExtractor::new(),
        }
    }
}

impl FeatureExtractor for BlobBriefExtractor {
    fn extract(&self, frame: &RgbImage, frame_index: usize) -> Result<FeatureSet> {
        anyhow::ensure!(
            frame.width() > 0 && frame.height() > 0,
            "frame {} is empty",
            frame_index
        );
        let keypoints = self.detector.detect(frame, frame_index);
        let descriptors = self.brief.compute_all(frame, &keypoints);
        Ok(FeatureSet::new(keypoints, descriptors))
    }
}
