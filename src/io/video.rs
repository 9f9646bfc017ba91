//! Video container input and output through OpenCV.
//!
//! Frames cross the boundary as `RgbImage`; OpenCV's BGR byte order is
//! swapped on the way in and out.

use std::path::Path;

use anyhow::{Context, Result, bail};
use image::RgbImage;
use opencv::core::{CV_8UC3, Mat, Scalar, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use tracing::info;

use super::frames::FrameSource;
use super::overlay::OverlaySink;

const VIDEO_EXTENSIONS: [&str; 4] = ["avi", "mp4", "mkv", "mov"];

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path {} is not valid UTF-8", path.display()))
}

pub struct VideoFileSource {
    capture: VideoCapture,
    fps: Option<f64>,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let capture = VideoCapture::from_file(path_str(path)?, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open video {}", path.display()))?;
        if !capture.is_opened()? {
            bail!("Could not open video {}", path.display());
        }
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let fps = (fps.is_finite() && fps > 0.0).then_some(fps);
        info!("Opened {} (fps: {:?})", path.display(), fps);
        Ok(Self { capture, fps })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        bgr_mat_to_rgb(&mat).map(Some)
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

pub struct VideoOverlaySink {
    writer: VideoWriter,
    size: (u32, u32),
}

impl VideoOverlaySink {
    pub fn create(path: &Path, fps: f64, width: u32, height: u32) -> Result<Self> {
        let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')?;
        let writer = VideoWriter::new(
            path_str(path)?,
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )
        .with_context(|| format!("Failed to create video {}", path.display()))?;
        if !writer.is_opened()? {
            bail!("Could not open video writer for {}", path.display());
        }
        Ok(Self {
            writer,
            size: (width, height),
        })
    }
}

impl OverlaySink for VideoOverlaySink {
    fn write_frame(&mut self, frame_index: usize, frame: &RgbImage) -> Result<()> {
        anyhow::ensure!(
            frame.dimensions() == self.size,
            "frame {} is {:?}, video is {:?}",
            frame_index,
            frame.dimensions(),
            self.size
        );
        let mat = rgb_to_bgr_mat(frame)?;
        self.writer.write(&mat)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        Ok(())
    }
}

fn bgr_mat_to_rgb(mat: &Mat) -> Result<RgbImage> {
    anyhow::ensure!(mat.typ() == CV_8UC3, "expected an 8-bit 3-channel frame");
    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for bgr in mat.data_bytes()?.chunks_exact(3) {
        rgb.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
    }
    RgbImage::from_raw(width, height, rgb).context("frame buffer size mismatch")
}

fn rgb_to_bgr_mat(frame: &RgbImage) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    for (dst, src) in mat
        .data_bytes_mut()?
        .chunks_exact_mut(3)
        .zip(frame.as_raw().chunks_exact(3))
    {
        dst.copy_from_slice(&[src[2], src[1], src[0]]);
    }
    Ok(mat)
}
