//! Pipeline orchestration.
//!
//! `stages` runs the bounded reader / extractor / matcher threads for the
//! association pass; `runner` ties both passes, selection, sonification and
//! output publishing together.

pub mod messages;
pub mod runner;
pub mod stages;

pub use messages::{FeatureMsg, FrameMsg, TransitionMsg};
pub use runner::{Association, OutputPaths, RunSummary, Runner, ToneReport, TrackReport};
pub use stages::{FeaturePipeline, StageOutcome};
