//! Brute-force temporal matching between consecutive frames.

use serde::{Deserialize, Serialize};

use crate::tracking::{FeatureSet, FrameMatch};

use super::FrameMatcher;

/// Matcher parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatcherConfig {
    /// Reject matches with a Hamming distance above this.
    pub max_distance: Option<u32>,
    /// Keep only mutual nearest neighbours.
    pub cross_check: bool,
    /// Only consider train features within this many pixels of the query.
    pub max_displacement: Option<f32>,
}

/// Nearest neighbour (k = 1) by Hamming distance.
pub struct BruteForceMatcher {
    config: MatcherConfig,
}

impl BruteForceMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    fn within_reach(&self, a: &FeatureSet, ai: usize, b: &FeatureSet, bi: usize) -> bool {
        match self.config.max_displacement {
            Some(max) => nalgebra::distance(&a.keypoints[ai].position, &b.keypoints[bi].position) <= max,
            None => true,
        }
    }

    /// Index and distance of the feature in `to` nearest to `from[index]`.
    /// Ties go to the lowest index.
    fn nearest(&self, from: &FeatureSet, index: usize, to: &FeatureSet) -> Option<(usize, u32)> {
        let desc = &from.descriptors[index];
        let mut best: Option<(usize, u32)> = None;
        for (j, candidate) in to.descriptors.iter().enumerate() {
            if !self.within_reach(from, index, to, j) {
                continue;
            }
            let dist = desc.hamming_distance(candidate);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((j, dist));
            }
        }
        best
    }
}

impl FrameMatcher for BruteForceMatcher {
    /// One match per query feature at most, in ascending query order.
    fn match_frames(&self, prev: &FeatureSet, curr: &FeatureSet) -> Vec<FrameMatch> {
        let mut matches = Vec::new();
        for query in 0..prev.descriptors.len() {
            let Some((train, dist)) = self.nearest(prev, query, curr) else {
                continue;
            };
            if self.config.max_distance.is_some_and(|max| dist > max) {
                continue;
            }
            if self.config.cross_check
                && self.nearest(curr, train, prev).map(|(q, _)| q) != Some(query)
            {
                continue;
            }
            matches.push(FrameMatch::new(query, train, dist as f32));
        }
        matches
    }
}
