//! Core value types shared by the association engine, selector and sonifier.

use nalgebra::Point2;

/// Unique identifier for a Track within a TrackSet.
///
/// TrackIds are assigned sequentially when Tracks are created, so a TrackId
/// is also the track's position in the TrackSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub usize);

impl TrackId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A detected feature point in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeaturePoint {
    /// Pixel position (x = column, y = row).
    pub position: Point2<f32>,
    /// Diameter of the meaningful neighbourhood, in pixels.
    pub size: f32,
    /// Absolute frame index this feature was detected in.
    pub frame: usize,
}

impl FeaturePoint {
    pub fn new(x: f32, y: f32, size: f32, frame: usize) -> Self {
        Self {
            position: Point2::new(x, y),
            size,
            frame,
        }
    }

    pub fn x(&self) -> f32 {
        self.position.x
    }

    pub fn y(&self) -> f32 {
        self.position.y
    }
}

/// A 256-bit binary descriptor (same layout as an ORB row: 32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; 32]);

impl Descriptor {
    pub fn zeros() -> Self {
        Self([0; 32])
    }

    /// Number of differing bits (0-256).
    #[inline]
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Features extracted from one frame.
///
/// `descriptors[i]` describes `keypoints[i]`.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<FeaturePoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn new(keypoints: Vec<FeaturePoint>, descriptors: Vec<Descriptor>) -> Self {
        debug_assert_eq!(keypoints.len(), descriptors.len());
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A candidate correspondence between frame t-1 (query) and frame t (train).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMatch {
    pub query_index: usize,
    pub train_index: usize,
    /// Descriptor distance; lower is better.
    pub distance: f32,
}

impl FrameMatch {
    pub fn new(query_index: usize, train_index: usize, distance: f32) -> Self {
        Self {
            query_index,
            train_index,
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        let a = Descriptor::zeros();
        assert_eq!(a.hamming_distance(&a), 0);

        let mut c = [0u8; 32];
        c[0] = 0xFF;
        c[1] = 0x0F;
        assert_eq!(a.hamming_distance(&Descriptor(c)), 12);

        assert_eq!(a.hamming_distance(&Descriptor([0xFF; 32])), 256);
    }

    #[test]
    fn test_track_id_display() {
        assert_eq!(format!("{}", TrackId::new(7)), "T7");
    }
}
