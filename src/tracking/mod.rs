//! Feature tracking: stitches per-frame matches into persistent Tracks.
//!
//! This module implements the core of the tracking stage:
//! - Track storage (sparse per-frame observations)
//! - Association engine (extend / create / resolve conflicting claims)
//! - Selection by presence and longest contiguous run
//! - Colour sampling of selected tracks

pub mod engine;
pub mod sampling;
pub mod selector;
pub mod track;
pub mod types;

pub use engine::{AssociationEngine, AssociationError, ConflictPolicy, TransitionStats};
pub use sampling::{ColorSampler, SampleStats, sample_frame_colors};
pub use selector::{SelectionConfig, TrackScore, TrackSelector, rank_by_presence};
pub use track::{Observation, Track, TrackSet, TrackTable};
pub use types::{Descriptor, FeatureSet, FeaturePoint, FrameMatch, TrackId};
