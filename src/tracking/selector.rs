//! Track selection by presence and continuity.
//!
//! Two measures are computed per Track:
//! - presence: number of frames with a detection
//! - longest run: largest number of consecutive frames with a detection
//!
//! The selector composes them according to [`SelectionConfig`]; which
//! combination is used is a configuration decision.

use serde::{Deserialize, Serialize};

use super::track::TrackSet;
use super::types::TrackId;

/// Selection thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Keep only the K most present tracks.
    pub top_k: Option<usize>,
    /// Minimum presence (frames with a detection).
    pub min_presence: Option<usize>,
    /// Minimum longest contiguous run.
    pub min_run: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: Some(20),
            min_presence: None,
            min_run: 0,
        }
    }
}

/// Both selection measures for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackScore {
    pub id: TrackId,
    pub presence: usize,
    pub longest_run: usize,
}

/// Score every track and sort by presence, descending.
///
/// Ties are broken by ascending TrackId so the ranking is deterministic.
pub fn rank_by_presence(tracks: &TrackSet) -> Vec<TrackScore> {
    let mut scores: Vec<TrackScore> = tracks
        .iter()
        .map(|t| TrackScore {
            id: t.id,
            presence: t.presence(),
            longest_run: t.longest_run(),
        })
        .collect();
    scores.sort_by(|a, b| b.presence.cmp(&a.presence).then(a.id.cmp(&b.id)));
    scores
}

pub struct TrackSelector {
    config: SelectionConfig,
}

impl TrackSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Presence-ranked list of tracks passing every configured threshold.
    pub fn select(&self, tracks: &TrackSet) -> Vec<TrackScore> {
        let min_presence = self.config.min_presence.unwrap_or(0);
        let mut selected: Vec<TrackScore> = rank_by_presence(tracks)
            .into_iter()
            .filter(|s| s.presence >= min_presence)
            .filter(|s| s.longest_run >= self.config.min_run)
            .collect();

        if let Some(k) = self.config.top_k {
            selected.truncate(k);
        }

        selected
    }
}
