//! Bright blob detection.
//!
//! Thresholds one colour channel and reports every 8-connected component of
//! at least `min_area` pixels as a feature point at its centroid. Suited to
//! point-like light sources (stars, particles) on a dark background.

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::tracking::FeaturePoint;

/// Blob detector parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Colour channel to threshold (0 = R, 1 = G, 2 = B).
    pub channel: usize,
    /// Minimum channel value of a blob pixel.
    pub threshold: u8,
    /// Minimum blob area in pixels.
    pub min_area: u32,
    /// Maximum number of blobs kept per frame (largest first).
    pub max_features: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            channel: 2,
            threshold: 200,
            min_area: 3,
            max_features: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BlobAccumulator {
    area: u32,
    sum_x: f64,
    sum_y: f64,
}

pub struct BlobDetector {
    config: DetectorConfig,
}

impl BlobDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Binary mask of pixels at or above the threshold in the configured channel.
    pub fn threshold(&self, frame: &RgbImage) -> GrayImage {
        let channel = self.config.channel.min(2);
        let threshold = self.config.threshold;
        GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            if frame.get_pixel(x, y).0[channel] >= threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Detect blobs in `frame`. Output order is deterministic: area
    /// descending, then row, then column.
    pub fn detect(&self, frame: &RgbImage, frame_index: usize) -> Vec<FeaturePoint> {
        let mask = self.threshold(frame);
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut blobs: Vec<BlobAccumulator> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if blobs.len() < label {
                blobs.resize(label, BlobAccumulator::default());
            }
            let blob = &mut blobs[label - 1];
            blob.area += 1;
            blob.sum_x += f64::from(x);
            blob.sum_y += f64::from(y);
        }

        let mut keypoints: Vec<(u32, FeaturePoint)> = blobs
            .iter()
            .filter(|b| b.area >= self.config.min_area.max(1))
            .map(|b| {
                let area = f64::from(b.area);
                let diameter = 2.0 * (area / std::f64::consts::PI).sqrt();
                let kp = FeaturePoint::new(
                    (b.sum_x / area) as f32,
                    (b.sum_y / area) as f32,
                    diameter as f32,
                    frame_index,
                );
                (b.area, kp)
            })
            .collect();

        keypoints.sort_by(|(area_a, a), (area_b, b)| {
            area_b
                .cmp(area_a)
                .then(a.y().total_cmp(&b.y()))
                .then(a.x().total_cmp(&b.x()))
        });
        keypoints.truncate(self.config.max_features);

        keypoints.into_iter().map(|(_, kp)| kp).collect()
    }
}
