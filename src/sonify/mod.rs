//! Sonification: colour/position samples of selected tracks to audio.
//!
//! - `color`: hue -> wavelength -> frequency / MIDI note mapping
//! - `signal`: stereo buffers, sine oscillator, panning
//! - `sonifier`: per-track segmentation and synthesis
//! - `mixer`: canonical-order summation into one stereo bus

pub mod color;
pub mod mixer;
pub mod signal;
pub mod sonifier;

pub use color::{MidiNote, WavelengthMapper, hue_to_wavelength, rgb_to_hsv};
pub use mixer::mix_tracks;
pub use signal::{SineOscillator, StereoBuffer, frame_to_sample, pan_gains};
pub use sonifier::{
    PanMode, Segment, SegmentKind, SonifiedTrack, SonifyConfig, ToneSampling, TrackSonifier,
};
