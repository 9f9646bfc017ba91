//! Overlay output: frames annotated with the positions of selected tracks.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;

use crate::tracking::FeaturePoint;

pub const MARKER_COLOR: Rgb<u8> = Rgb([128, 0, 128]);

/// Receives annotated frames in order.
pub trait OverlaySink {
    fn write_frame(&mut self, frame_index: usize, frame: &RgbImage) -> Result<()>;

    /// Flush and close. Called once after the last frame.
    fn finish(&mut self) -> Result<()>;
}

/// Draw one circle per keypoint, sized by the keypoint's diameter.
pub fn draw_keypoints(frame: &mut RgbImage, keypoints: &[FeaturePoint], color: Rgb<u8>) {
    for kp in keypoints {
        let center = (kp.x().round() as i32, kp.y().round() as i32);
        let radius = ((kp.size / 2.0).round() as i32).max(2);
        draw_hollow_circle_mut(frame, center, radius, color);
    }
}

/// Writes `frame_000000.png`, `frame_000001.png`, ... into a directory.
pub struct PngSequenceSink {
    dir: PathBuf,
    written: usize,
}

impl PngSequenceSink {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create overlay dir {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn frame_path(&self, frame_index: usize) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", frame_index))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl OverlaySink for PngSequenceSink {
    fn write_frame(&mut self, frame_index: usize, frame: &RgbImage) -> Result<()> {
        let path = self.frame_path(frame_index);
        frame
            .save(&path)
            .with_context(|| format!("Failed to write overlay frame {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Overlay sink for `path`: a video container when the `opencv` feature is
/// enabled and the extension names one, a PNG directory otherwise.
pub fn create_sink(
    path: &Path,
    fps: f64,
    width: u32,
    height: u32,
) -> Result<Box<dyn OverlaySink>> {
    #[cfg(feature = "opencv")]
    if super::video::is_video_path(path) {
        return Ok(Box::new(super::video::VideoOverlaySink::create(
            path, fps, width, height,
        )?));
    }
    let _ = (fps, width, height);
    Ok(Box::new(PngSequenceSink::create(path)?))
}
