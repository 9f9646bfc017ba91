//! Frame input, overlay and audio output.

pub mod frames;
pub mod overlay;
pub mod staging;
#[cfg(feature = "opencv")]
pub mod video;
pub mod wav;

pub use frames::{FrameSource, ImageSequenceSource, MemorySource, open_source};
pub use overlay::{OverlaySink, PngSequenceSink, create_sink, draw_keypoints};
pub use staging::OutputStage;
pub use wav::write_wav;
