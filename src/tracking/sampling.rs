//! Per-frame colour sampling for selected tracks.

use image::{Rgb, RgbImage};

use super::track::TrackSet;
use super::types::TrackId;

/// Reads the colour under a keypoint position in one frame.
pub trait ColorSampler {
    /// Colour at pixel `(floor(x), floor(y))`, or None when the position is
    /// outside the frame.
    fn sample(&self, x: f32, y: f32) -> Option<Rgb<u8>>;
}

impl ColorSampler for RgbImage {
    fn sample(&self, x: f32, y: f32) -> Option<Rgb<u8>> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let (col, row) = (x.floor() as u32, y.floor() as u32);
        if col >= self.width() || row >= self.height() {
            return None;
        }
        Some(*self.get_pixel(col, row))
    }
}

/// Outcome of sampling one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleStats {
    pub sampled: usize,
    /// Tracks with a keypoint in this frame but no readable pixel.
    pub missing: usize,
}

/// Store the colour under each selected track's keypoint at `frame`.
pub fn sample_frame_colors<S: ColorSampler + ?Sized>(
    tracks: &mut TrackSet,
    selected: &[TrackId],
    frame: usize,
    sampler: &S,
) -> SampleStats {
    let mut stats = SampleStats::default();
    for &id in selected {
        let Some(track) = tracks.get_mut(id) else {
            continue;
        };
        let Some(kp) = track.keypoint(frame).copied() else {
            continue;
        };
        match sampler.sample(kp.x(), kp.y()) {
            Some(color) => {
                track.set_color_sample(frame, color);
                stats.sampled += 1;
            }
            None => stats.missing += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::types::FeaturePoint;

    #[test]
    fn test_rgb_image_sampler_bounds() {
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(3, 2, Rgb([1, 2, 3]));
        assert_eq!(img.sample(3.9, 2.5), Some(Rgb([1, 2, 3])));
        assert_eq!(img.sample(4.0, 0.0), None);
        assert_eq!(img.sample(-0.5, 0.0), None);
        assert_eq!(img.sample(f32::NAN, 0.0), None);
    }

    #[test]
    fn test_sample_frame_colors_counts_missing() {
        let mut tracks = TrackSet::new();
        let inside = tracks.create();
        let outside = tracks.create();
        tracks
            .get_mut(inside)
            .unwrap()
            .observe(0, 0, FeaturePoint::new(1.0, 1.0, 2.0, 0), None);
        tracks
            .get_mut(outside)
            .unwrap()
            .observe(0, 1, FeaturePoint::new(50.0, 1.0, 2.0, 0), None);

        let img = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let stats = sample_frame_colors(&mut tracks, &[inside, outside], 0, &img);

        assert_eq!(stats, SampleStats { sampled: 1, missing: 1 });
        assert_eq!(tracks.get(inside).unwrap().color_sample(0), Some(Rgb([10, 20, 30])));
        assert_eq!(tracks.get(outside).unwrap().color_sample(0), None);
    }
}
