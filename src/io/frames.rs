//! Frame sources.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use image::RgbImage;
use tracing::info;

/// An ordered, gap-free sequence of frames.
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Native frame rate, if the container knows it.
    fn fps(&self) -> Option<f64>;
}

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A directory of still images, read in file name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    fps: Option<f64>,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && path.is_file() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            bail!("No image frames found in {}", dir.display());
        }
        paths.sort();
        info!("Found {} frames in {}", paths.len(), dir.display());

        Ok(Self {
            paths,
            cursor: 0,
            fps: None,
        })
    }

    /// Image directories carry no timing; attach one.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let frame = image::open(path)
            .with_context(|| format!("Failed to read frame {}", path.display()))?
            .to_rgb8();
        Ok(Some(frame))
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

/// In-memory frames, mostly for tests and synthetic input.
#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: std::vec::IntoIter<RgbImage>,
    fps: Option<f64>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: Option<f64>) -> Self {
        Self {
            frames: frames.into_iter(),
            fps,
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.next())
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

/// Open `path` as a frame source: a directory is an image sequence, a file
/// is a video (requires the `opencv` feature).
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path)?));
    }
    open_video(path)
}

#[cfg(feature = "opencv")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(super::video::VideoFileSource::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    bail!(
        "{} is not a frame directory; video files need the `opencv` feature",
        path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_image_sequence_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 2u8), ("a.png", 1), ("c.png", 3)] {
            RgbImage::from_pixel(4, 4, Rgb([value, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap().with_fps(12.0);
        assert_eq!(source.len(), 3);
        assert_eq!(source.fps(), Some(12.0));

        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            seen.push(frame.get_pixel(0, 0).0[0]);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(dir.path()).is_err());
    }

    #[test]
    fn test_memory_source_ends() {
        let mut source = MemorySource::new(vec![RgbImage::new(2, 2)], Some(30.0));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
