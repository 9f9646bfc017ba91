//! Track - the trajectory of one physical feature across frames.
//!
//! A Track is stored as a sparse per-frame sequence indexed by absolute frame
//! number. Frames where the feature was not claimed are gaps, not the end of
//! the track: a Track is never closed and stays eligible for extension.

use std::collections::HashMap;

use image::Rgb;

use super::types::{FeaturePoint, FrameMatch, TrackId};

/// Detection recorded for a Track in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Index of the feature in that frame's detection set.
    pub index: usize,
    /// The feature at `index`.
    pub keypoint: FeaturePoint,
    /// Match that extended the track into this frame.
    /// None for the frame the track was created in.
    pub best_match: Option<FrameMatch>,
}

/// A trajectory of one feature, stored per absolute frame.
///
/// Cells cover only `origin..origin + len`, so storage follows the frames the
/// track was actually seen in rather than the clip length.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// Absolute frame of the first stored cell.
    origin: usize,
    observations: Vec<Option<Observation>>,
    color_samples: Vec<Option<Rgb<u8>>>,
}

impl Track {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            origin: 0,
            observations: Vec::new(),
            color_samples: Vec::new(),
        }
    }

    /// Move `origin` down to `frame` if it lies before the stored span.
    fn rebase(&mut self, frame: usize) {
        if self.observations.is_empty() && self.color_samples.is_empty() {
            self.origin = frame;
            return;
        }
        if frame >= self.origin {
            return;
        }
        let shift = self.origin - frame;
        if !self.observations.is_empty() {
            self.observations
                .splice(0..0, std::iter::repeat(None).take(shift));
        }
        if !self.color_samples.is_empty() {
            self.color_samples
                .splice(0..0, std::iter::repeat(None).take(shift));
        }
        self.origin = frame;
    }

    fn offset(&self, frame: usize) -> Option<usize> {
        frame.checked_sub(self.origin)
    }

    /// Record a detection at `frame`. Overwrites any previous cell.
    pub fn observe(
        &mut self,
        frame: usize,
        index: usize,
        keypoint: FeaturePoint,
        best_match: Option<FrameMatch>,
    ) {
        self.rebase(frame);
        let at = frame - self.origin;
        if self.observations.len() <= at {
            self.observations.resize(at + 1, None);
        }
        self.observations[at] = Some(Observation {
            index,
            keypoint,
            best_match,
        });
    }

    pub fn observation(&self, frame: usize) -> Option<&Observation> {
        self.offset(frame)
            .and_then(|at| self.observations.get(at))
            .and_then(|o| o.as_ref())
    }

    /// Source feature index at `frame`, if the track was claimed there.
    pub fn index(&self, frame: usize) -> Option<usize> {
        self.observation(frame).map(|o| o.index)
    }

    pub fn keypoint(&self, frame: usize) -> Option<&FeaturePoint> {
        self.observation(frame).map(|o| &o.keypoint)
    }

    pub fn best_match(&self, frame: usize) -> Option<&FrameMatch> {
        self.observation(frame).and_then(|o| o.best_match.as_ref())
    }

    pub fn color_sample(&self, frame: usize) -> Option<Rgb<u8>> {
        self.offset(frame)
            .and_then(|at| self.color_samples.get(at))
            .copied()
            .flatten()
    }

    pub fn set_color_sample(&mut self, frame: usize, color: Rgb<u8>) {
        self.rebase(frame);
        let at = frame - self.origin;
        if self.color_samples.len() <= at {
            self.color_samples.resize(at + 1, None);
        }
        self.color_samples[at] = Some(color);
    }

    /// Number of frames covered by stored observation cells.
    pub fn span(&self) -> usize {
        self.observations.len()
    }

    /// Number of frames with a recorded detection.
    pub fn presence(&self) -> usize {
        self.observations.iter().filter(|o| o.is_some()).count()
    }

    /// Largest number of consecutive frames with a recorded detection.
    pub fn longest_run(&self) -> usize {
        let mut longest = 0;
        let mut current = 0;
        for obs in &self.observations {
            if obs.is_some() {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 0;
            }
        }
        longest
    }

    pub fn first_frame(&self) -> Option<usize> {
        self.observations
            .iter()
            .position(|o| o.is_some())
            .map(|at| at + self.origin)
    }

    pub fn last_frame(&self) -> Option<usize> {
        self.observations
            .iter()
            .rposition(|o| o.is_some())
            .map(|at| at + self.origin)
    }

    /// Iterate over `(frame, observation)` for every claimed frame.
    pub fn observations(&self) -> impl Iterator<Item = (usize, &Observation)> {
        self.observations
            .iter()
            .enumerate()
            .filter_map(|(at, o)| o.as_ref().map(|o| (at + self.origin, o)))
    }

    /// Drop all colour samples (before a fresh sampling pass).
    pub fn clear_color_samples(&mut self) {
        self.color_samples.clear();
    }
}

/// Maps a frame's feature index to the Track claiming it.
///
/// Only valid for a single frame; the engine rebuilds it every transition.
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    owners: HashMap<usize, TrackId>,
}

impl TrackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feature_index: usize) -> Option<TrackId> {
        self.owners.get(&feature_index).copied()
    }

    pub fn insert(&mut self, feature_index: usize, track: TrackId) {
        self.owners.insert(feature_index, track);
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Append-only ordered collection of all Tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSet {
    tracks: Vec<Track>,
    frame_count: usize,
}

impl TrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new empty track and return its id.
    pub fn create(&mut self) -> TrackId {
        let id = TrackId::new(self.tracks.len());
        self.tracks.push(Track::new(id));
        id
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id.0)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of frames the set was built from (N).
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub(crate) fn set_frame_count(&mut self, frame_count: usize) {
        self.frame_count = frame_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(frame: usize) -> FeaturePoint {
        FeaturePoint::new(10.0, 20.0, 3.0, frame)
    }

    #[test]
    fn test_presence_and_longest_run() {
        let mut track = Track::new(TrackId::new(0));
        for f in [0, 1, 2, 5, 6, 9] {
            track.observe(f, 0, kp(f), None);
        }
        assert_eq!(track.presence(), 6);
        assert_eq!(track.longest_run(), 3);
        assert_eq!(track.first_frame(), Some(0));
        assert_eq!(track.last_frame(), Some(9));
        assert!(track.longest_run() <= track.presence());
    }

    #[test]
    fn test_empty_track() {
        let track = Track::new(TrackId::new(0));
        assert_eq!(track.presence(), 0);
        assert_eq!(track.longest_run(), 0);
        assert_eq!(track.first_frame(), None);
        assert!(track.keypoint(3).is_none());
    }

    #[test]
    fn test_storage_follows_observed_frames() {
        let mut track = Track::new(TrackId::new(0));
        track.observe(850, 4, kp(850), None);
        assert_eq!(track.span(), 1);
        assert!(track.observations.capacity() < 8);
        assert_eq!(track.index(850), Some(4));
        assert_eq!(track.index(849), None);
        assert_eq!(track.first_frame(), Some(850));
        assert_eq!(track.presence(), 1);

        track.observe(853, 1, kp(853), None);
        assert_eq!(track.span(), 4);
        assert_eq!(track.last_frame(), Some(853));
        let frames: Vec<usize> = track.observations().map(|(f, _)| f).collect();
        assert_eq!(frames, vec![850, 853]);
    }

    #[test]
    fn test_earlier_frame_extends_span_backwards() {
        let mut track = Track::new(TrackId::new(0));
        track.observe(10, 0, kp(10), None);
        track.set_color_sample(10, Rgb([1, 2, 3]));
        track.observe(7, 2, kp(7), None);
        assert_eq!(track.span(), 4);
        assert_eq!(track.first_frame(), Some(7));
        assert_eq!(track.index(10), Some(0));
        assert_eq!(track.color_sample(10), Some(Rgb([1, 2, 3])));
        assert_eq!(track.color_sample(7), None);
    }

    #[test]
    fn test_color_samples_are_independent_of_observations() {
        let mut track = Track::new(TrackId::new(0));
        track.observe(1, 0, kp(1), None);
        track.set_color_sample(1, Rgb([255, 0, 0]));
        assert_eq!(track.color_sample(1), Some(Rgb([255, 0, 0])));
        assert_eq!(track.color_sample(0), None);
        assert_eq!(track.color_sample(100), None);

        track.clear_color_samples();
        assert_eq!(track.color_sample(1), None);
        assert_eq!(track.presence(), 1);
    }

    #[test]
    fn test_track_set_ids_are_sequential() {
        let mut set = TrackSet::new();
        let a = set.create();
        let b = set.create();
        assert_eq!(a, TrackId::new(0));
        assert_eq!(b, TrackId::new(1));
        assert_eq!(set.get(b).map(|t| t.id), Some(b));
        assert_eq!(set.len(), 2);
    }
}
