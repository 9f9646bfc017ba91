//! Track association engine.
//!
//! Consumes per-frame detections and the matches of each consecutive frame
//! pair, and stitches them into long-lived Tracks:
//! - a match whose query feature already belongs to a Track extends it
//! - a match whose query feature is unowned starts a new Track
//! - when several matches claim the same train feature, exactly one wins
//!   (see [`ConflictPolicy`]); the others get a gap in that frame
//!
//! Frames must arrive in strict, gap-free increasing order. Each transition
//! depends on the previous frame's [`TrackTable`], so the engine is
//! sequential by construction.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::track::{TrackSet, TrackTable};
use super::types::{FeaturePoint, FrameMatch, TrackId};

/// How competing claims on one train feature are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Lowest distance wins. Candidates are visited in ascending
    /// `(distance, query_index, train_index)` order.
    #[default]
    BestDistance,
    /// The claim appearing last in the supplied match order wins.
    LastInOrder,
}

/// Fatal association failures. Any of these aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationError {
    /// A match references a query feature owned by a Track whose recorded
    /// index for the previous frame disagrees.
    ConsistencyViolation {
        frame: usize,
        track: TrackId,
        query_index: usize,
        recorded: Option<usize>,
    },
    /// A match references a feature index that does not exist.
    FeatureIndexOutOfRange {
        frame: usize,
        query_index: usize,
        train_index: usize,
        prev_features: usize,
        curr_features: usize,
    },
    /// A frame arrived out of sequence.
    OutOfOrderFrame { expected: usize, got: usize },
}

impl std::fmt::Display for AssociationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationError::ConsistencyViolation {
                frame,
                track,
                query_index,
                recorded,
            } => write!(
                f,
                "Consistency violation at frame {}: {} owns query feature {} but recorded {:?} for frame {}",
                frame,
                track,
                query_index,
                recorded,
                frame.saturating_sub(1)
            ),
            AssociationError::FeatureIndexOutOfRange {
                frame,
                query_index,
                train_index,
                prev_features,
                curr_features,
            } => write!(
                f,
                "Match {}->{} at frame {} out of range ({} previous / {} current features)",
                query_index, train_index, frame, prev_features, curr_features
            ),
            AssociationError::OutOfOrderFrame { expected, got } => {
                write!(f, "Frame {} arrived out of order (expected {})", got, expected)
            }
        }
    }
}

impl std::error::Error for AssociationError {}

/// Counters describing one processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionStats {
    pub frame: usize,
    pub matches: usize,
    pub tracks_created: usize,
    /// Claims accepted for this frame.
    pub claims: usize,
    /// Candidates that lost a conflict and got a gap.
    pub conflicts_lost: usize,
}

/// Sequential multi-object correspondence engine.
pub struct AssociationEngine {
    policy: ConflictPolicy,
    tracks: TrackSet,
    /// Owners of the previous frame's features.
    table: TrackTable,
    prev_keypoints: Vec<FeaturePoint>,
    next_frame: usize,
}

impl AssociationEngine {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            tracks: TrackSet::new(),
            table: TrackTable::new(),
            prev_keypoints: Vec::new(),
            next_frame: 0,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Number of frames consumed so far.
    pub fn frames_processed(&self) -> usize {
        self.next_frame
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    /// Consume frame `frame` with its detections and the matches from the
    /// previous frame (`query_index` into the previous frame's keypoints,
    /// `train_index` into `keypoints`). Frame 0 takes no matches.
    pub fn process_frame(
        &mut self,
        frame: usize,
        keypoints: Vec<FeaturePoint>,
        matches: &[FrameMatch],
    ) -> Result<TransitionStats, AssociationError> {
        if frame != self.next_frame {
            return Err(AssociationError::OutOfOrderFrame {
                expected: self.next_frame,
                got: frame,
            });
        }

        for m in matches {
            if m.query_index >= self.prev_keypoints.len() || m.train_index >= keypoints.len() {
                return Err(AssociationError::FeatureIndexOutOfRange {
                    frame,
                    query_index: m.query_index,
                    train_index: m.train_index,
                    prev_features: self.prev_keypoints.len(),
                    curr_features: keypoints.len(),
                });
            }
        }

        let mut stats = TransitionStats {
            frame,
            matches: matches.len(),
            ..Default::default()
        };

        if frame > 0 {
            let candidates = self.resolve_owners(frame - 1, matches, &mut stats)?;
            self.table = self.assign_claims(frame, &keypoints, candidates, &mut stats);
        }

        self.prev_keypoints = keypoints;
        self.next_frame += 1;

        debug!(
            "Frame {}: {} matches, {} new tracks, {} claims, {} conflicts lost ({} tracks total)",
            stats.frame,
            stats.matches,
            stats.tracks_created,
            stats.claims,
            stats.conflicts_lost,
            self.tracks.len()
        );

        Ok(stats)
    }

    /// Find or create the Track behind every match's query feature.
    ///
    /// Returns one candidate per match, in supplied order.
    fn resolve_owners(
        &mut self,
        prev_frame: usize,
        matches: &[FrameMatch],
        stats: &mut TransitionStats,
    ) -> Result<Vec<(TrackId, FrameMatch)>, AssociationError> {
        let mut created_for: HashMap<usize, TrackId> = HashMap::new();
        let mut candidates = Vec::with_capacity(matches.len());

        for m in matches {
            let track_id = if let Some(owner) = self.table.get(m.query_index) {
                let recorded = self.tracks.get(owner).and_then(|t| t.index(prev_frame));
                if recorded != Some(m.query_index) {
                    return Err(AssociationError::ConsistencyViolation {
                        frame: prev_frame + 1,
                        track: owner,
                        query_index: m.query_index,
                        recorded,
                    });
                }
                owner
            } else if let Some(&id) = created_for.get(&m.query_index) {
                id
            } else {
                let id = self.tracks.create();
                let keypoint = self.prev_keypoints[m.query_index];
                if let Some(track) = self.tracks.get_mut(id) {
                    track.observe(prev_frame, m.query_index, keypoint, None);
                }
                created_for.insert(m.query_index, id);
                stats.tracks_created += 1;
                id
            };
            candidates.push((track_id, *m));
        }

        Ok(candidates)
    }

    /// Assign train features one-to-one according to the conflict policy and
    /// return the table of owners for `frame`.
    fn assign_claims(
        &mut self,
        frame: usize,
        keypoints: &[FeaturePoint],
        mut candidates: Vec<(TrackId, FrameMatch)>,
        stats: &mut TransitionStats,
    ) -> TrackTable {
        match self.policy {
            ConflictPolicy::BestDistance => candidates.sort_by(|(_, a), (_, b)| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(a.query_index.cmp(&b.query_index))
                    .then(a.train_index.cmp(&b.train_index))
            }),
            ConflictPolicy::LastInOrder => candidates.reverse(),
        }

        let mut table = TrackTable::new();
        let mut extended: HashSet<TrackId> = HashSet::new();

        for (track_id, m) in candidates {
            if table.get(m.train_index).is_some() || extended.contains(&track_id) {
                stats.conflicts_lost += 1;
                continue;
            }
            if let Some(track) = self.tracks.get_mut(track_id) {
                track.observe(frame, m.train_index, keypoints[m.train_index], Some(m));
            }
            table.insert(m.train_index, track_id);
            extended.insert(track_id);
            stats.claims += 1;
        }

        table
    }

    /// Finish association and hand out the read-only TrackSet.
    pub fn finish(mut self) -> TrackSet {
        self.tracks.set_frame_count(self.next_frame);
        self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoints(frame: usize, n: usize) -> Vec<FeaturePoint> {
        (0..n)
            .map(|i| FeaturePoint::new(i as f32 * 10.0, 5.0, 3.0, frame))
            .collect()
    }

    #[test]
    fn test_single_feature_gap_scenario() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 1), &[]).unwrap();
        engine
            .process_frame(1, keypoints(1, 1), &[FrameMatch::new(0, 0, 1.0)])
            .unwrap();
        engine.process_frame(2, keypoints(2, 1), &[]).unwrap();

        let tracks = engine.finish();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks.frame_count(), 3);
        let track = tracks.get(TrackId::new(0)).unwrap();
        assert_eq!(track.presence(), 2);
        assert_eq!(track.longest_run(), 2);
        assert_eq!(track.index(0), Some(0));
        assert_eq!(track.index(1), Some(0));
        assert_eq!(track.index(2), None);
        assert!(track.best_match(0).is_none());
        assert_eq!(track.best_match(1).map(|m| m.distance), Some(1.0));
    }

    #[test]
    fn test_conflict_best_distance_wins() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 2), &[]).unwrap();
        let matches = [FrameMatch::new(1, 5, 0.7), FrameMatch::new(0, 5, 0.3)];
        let stats = engine.process_frame(1, keypoints(1, 6), &matches).unwrap();

        assert_eq!(stats.tracks_created, 2);
        assert_eq!(stats.claims, 1);
        assert_eq!(stats.conflicts_lost, 1);

        let tracks = engine.finish();
        let claimed: Vec<_> = tracks.iter().filter(|t| t.index(1) == Some(5)).collect();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].index(0), Some(0));

        let loser = tracks.iter().find(|t| t.index(0) == Some(1)).unwrap();
        assert_eq!(loser.index(1), None);
        assert_eq!(loser.presence(), 1);
    }

    #[test]
    fn test_conflict_last_in_order_wins() {
        let mut engine = AssociationEngine::new(ConflictPolicy::LastInOrder);
        engine.process_frame(0, keypoints(0, 2), &[]).unwrap();
        let matches = [FrameMatch::new(0, 5, 0.3), FrameMatch::new(1, 5, 0.7)];
        engine.process_frame(1, keypoints(1, 6), &matches).unwrap();

        let tracks = engine.finish();
        let winner = tracks.iter().find(|t| t.index(1) == Some(5)).unwrap();
        assert_eq!(winner.index(0), Some(1));
    }

    #[test]
    fn test_duplicate_query_creates_one_track() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 1), &[]).unwrap();
        let matches = [FrameMatch::new(0, 1, 0.9), FrameMatch::new(0, 2, 0.2)];
        let stats = engine.process_frame(1, keypoints(1, 3), &matches).unwrap();

        assert_eq!(stats.tracks_created, 1);
        assert_eq!(stats.conflicts_lost, 1);
        let tracks = engine.finish();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks.get(TrackId::new(0)).unwrap().index(1), Some(2));
    }

    #[test]
    fn test_track_survives_gap_only_through_table() {
        // A track that is not claimed in frame 1 cannot be extended in frame 2:
        // frame 2's matches refer to frame 1's features, which it does not own.
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 1), &[]).unwrap();
        engine
            .process_frame(1, keypoints(1, 1), &[FrameMatch::new(0, 0, 1.0)])
            .unwrap();
        engine.process_frame(2, keypoints(2, 1), &[]).unwrap();
        engine
            .process_frame(3, keypoints(3, 1), &[FrameMatch::new(0, 0, 1.0)])
            .unwrap();

        let tracks = engine.finish();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks.get(TrackId::new(1)).unwrap().first_frame(), Some(2));
    }

    #[test]
    fn test_out_of_order_frame_is_fatal() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 1), &[]).unwrap();
        let err = engine.process_frame(2, keypoints(2, 1), &[]).unwrap_err();
        assert_eq!(err, AssociationError::OutOfOrderFrame { expected: 1, got: 2 });
    }

    #[test]
    fn test_matches_on_first_frame_are_out_of_range() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        let err = engine
            .process_frame(0, keypoints(0, 1), &[FrameMatch::new(0, 0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, AssociationError::FeatureIndexOutOfRange { .. }));
    }

    #[test]
    fn test_train_index_out_of_range() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 2), &[]).unwrap();
        let err = engine
            .process_frame(1, keypoints(1, 2), &[FrameMatch::new(0, 2, 0.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            AssociationError::FeatureIndexOutOfRange { train_index: 2, .. }
        ));
    }

    #[test]
    fn test_short_tracks_store_only_their_frames() {
        const FRAMES: usize = 300;
        const FEATURES: usize = 20;
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        // Every feature claims feature 0 of the next frame; all but one lose.
        let matches: Vec<FrameMatch> = (0..FEATURES)
            .map(|q| FrameMatch::new(q, 0, q as f32))
            .collect();
        engine.process_frame(0, keypoints(0, FEATURES), &[]).unwrap();
        for f in 1..FRAMES {
            engine
                .process_frame(f, keypoints(f, FEATURES), &matches)
                .unwrap();
        }

        let tracks = engine.finish();
        assert!(tracks.len() > (FEATURES - 1) * (FRAMES - 2));
        for track in tracks.iter() {
            let first = track.first_frame().unwrap();
            let last = track.last_frame().unwrap();
            assert_eq!(track.span(), last - first + 1);
        }
        let short = tracks.iter().filter(|t| t.presence() == 1).count();
        assert!(short >= (FEATURES - 1) * (FRAMES - 2));
        let stored: usize = tracks.iter().map(|t| t.span()).sum();
        let observed: usize = tracks.iter().map(|t| t.presence()).sum();
        assert_eq!(stored, observed);
    }

    #[test]
    fn test_corrupted_table_is_consistency_violation() {
        let mut engine = AssociationEngine::new(ConflictPolicy::BestDistance);
        engine.process_frame(0, keypoints(0, 2), &[]).unwrap();
        engine
            .process_frame(1, keypoints(1, 2), &[FrameMatch::new(0, 0, 1.0)])
            .unwrap();

        // Point feature 1 of frame 1 at a track that recorded feature 0.
        engine.table.insert(1, TrackId::new(0));

        let err = engine
            .process_frame(2, keypoints(2, 2), &[FrameMatch::new(1, 0, 1.0)])
            .unwrap_err();
        assert_eq!(
            err,
            AssociationError::ConsistencyViolation {
                frame: 2,
                track: TrackId::new(0),
                query_index: 1,
                recorded: Some(0),
            }
        );
        assert!(err.to_string().contains("Consistency violation"));
    }
}
