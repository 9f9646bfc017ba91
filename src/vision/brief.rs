//! BRIEF binary descriptors.
//!
//! Each of the 256 bits compares the smoothed intensity at two offsets
//! around the keypoint. The offset pattern is drawn from a seeded ChaCha
//! generator, so descriptors are identical across runs and machines.

use image::{GrayImage, RgbImage, imageops};
use imageproc::filter::gaussian_blur_f32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::tracking::{Descriptor, FeaturePoint};

/// Half-size of the sampling patch (31x31 patch, as in ORB).
pub const PATCH_RADIUS: i32 = 15;

const PATTERN_SEED: u64 = 0x5eed_b41e;

pub struct BriefExtractor {
    /// 256 pairs of (x1, y1, x2, y2) offsets.
    pattern: Vec<(i8, i8, i8, i8)>,
    /// Gaussian pre-smoothing sigma.
    sigma: f32,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BriefExtractor {
    pub fn new() -> Self {
        Self::with_seed(PATTERN_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let r = PATCH_RADIUS as i8;
        let pattern = (0..256)
            .map(|_| {
                (
                    rng.gen_range(-r..=r),
                    rng.gen_range(-r..=r),
                    rng.gen_range(-r..=r),
                    rng.gen_range(-r..=r),
                )
            })
            .collect();
        Self {
            pattern,
            sigma: 2.0,
        }
    }

    /// Grayscale, smoothed copy of a frame, ready for `compute`.
    pub fn prepare(&self, frame: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(frame);
        gaussian_blur_f32(&gray, self.sigma)
    }

    /// Descriptor of one keypoint on a prepared image.
    ///
    /// Offsets falling outside the image are clamped to the border, so every
    /// keypoint gets a descriptor and indices stay aligned with the keypoints.
    pub fn compute(&self, smoothed: &GrayImage, kp: &FeaturePoint) -> Descriptor {
        let mut bits = [0u8; 32];
        if smoothed.width() == 0 || smoothed.height() == 0 {
            return Descriptor(bits);
        }
        let max_x = smoothed.width() as i32 - 1;
        let max_y = smoothed.height() as i32 - 1;
        let cx = kp.x().round() as i32;
        let cy = kp.y().round() as i32;
        let at = |dx: i8, dy: i8| {
            let x = (cx + i32::from(dx)).clamp(0, max_x) as u32;
            let y = (cy + i32::from(dy)).clamp(0, max_y) as u32;
            smoothed.get_pixel(x, y).0[0]
        };

        for (i, &(x1, y1, x2, y2)) in self.pattern.iter().enumerate() {
            if at(x1, y1) < at(x2, y2) {
                bits[i / 8] |= 1 << (i % 8);
            }
        }
        Descriptor(bits)
    }

    pub fn compute_all(&self, frame: &RgbImage, keypoints: &[FeaturePoint]) -> Vec<Descriptor> {
        let smoothed = self.prepare(frame);
        keypoints.iter().map(|kp| self.compute(&smoothed, kp)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_pattern_is_deterministic() {
        let a = BriefExtractor::new();
        let b = BriefExtractor::new();
        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.pattern.len(), 256);
        assert_ne!(a.pattern, BriefExtractor::with_seed(1).pattern);
    }

    #[test]
    fn test_uniform_image_gives_zero_descriptor() {
        let extractor = BriefExtractor::new();
        let img = GrayImage::from_pixel(64, 64, Luma([90]));
        let desc = extractor.compute(&img, &FeaturePoint::new(32.0, 32.0, 3.0, 0));
        assert_eq!(desc, Descriptor::zeros());
    }

    #[test]
    fn test_border_keypoint_still_described() {
        let extractor = BriefExtractor::new();
        let img = GrayImage::from_fn(40, 40, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let desc = extractor.compute(&img, &FeaturePoint::new(0.0, 39.0, 3.0, 0));
        assert_ne!(desc, Descriptor::zeros());
    }

    #[test]
    fn test_translated_patch_keeps_descriptor() {
        let extractor = BriefExtractor::new();
        let pattern = |x: u32, y: u32| Rgb([0, 0, ((x * 13 + y * 29) % 251) as u8]);

        let a = RgbImage::from_fn(80, 80, pattern);
        // b shows a's content shifted left by 3 and up by 2.
        let b = RgbImage::from_fn(80, 80, |x, y| pattern(x + 3, y + 2));

        let da = extractor.compute_all(&a, &[FeaturePoint::new(40.0, 40.0, 3.0, 0)]);
        let db = extractor.compute_all(&b, &[FeaturePoint::new(37.0, 38.0, 3.0, 1)]);
        assert!(da[0].hamming_distance(&db[0]) < 16);
    }
}
