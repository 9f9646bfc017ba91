//! Sums sonified tracks into one stereo bus.

use tracing::{info, warn};

use super::signal::StereoBuffer;
use super::sonifier::SonifiedTrack;

/// Mix `tracks` in the given (canonical) order.
///
/// The bus is truncated to the shortest track. With no tracks the result is
/// `empty_len` samples of silence, so the output always covers the clip.
pub fn mix_tracks(tracks: &[SonifiedTrack], sample_rate: u32, empty_len: usize) -> StereoBuffer {
    let Some(shortest) = tracks.iter().map(|t| t.samples.len()).min() else {
        return StereoBuffer::silence(sample_rate, empty_len);
    };

    let mut bus = StereoBuffer::silence(sample_rate, shortest);
    for track in tracks {
        if track.samples.sample_rate != sample_rate {
            warn!(
                "{} rendered at {} Hz, mixing into {} Hz bus",
                track.id, track.samples.sample_rate, sample_rate
            );
        }
        bus.add_assign(&track.samples);
    }

    info!(
        "Mixed {} tracks: {:.2}s, peak {:.3}",
        tracks.len(),
        bus.duration_secs(),
        bus.peak()
    );
    bus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackId;

    fn constant_track(id: usize, value: f32, len: usize) -> SonifiedTrack {
        let mut samples = StereoBuffer::new(100);
        for _ in 0..len {
            samples.push(value, -value);
        }
        SonifiedTrack {
            id: TrackId::new(id),
            segments: Vec::new(),
            samples,
            missing_samples: 0,
        }
    }

    #[test]
    fn test_mix_sums_and_truncates_to_shortest() {
        let tracks = vec![constant_track(0, 0.25, 5), constant_track(1, 0.5, 3)];
        let bus = mix_tracks(&tracks, 100, 0);
        assert_eq!(bus.len(), 3);
        assert_eq!(bus.left, vec![0.75; 3]);
        assert_eq!(bus.right, vec![-0.75; 3]);
    }

    #[test]
    fn test_mix_without_tracks_is_silence() {
        let bus = mix_tracks(&[], 100, 42);
        assert_eq!(bus.len(), 42);
        assert_eq!(bus.peak(), 0.0);
    }

    #[test]
    fn test_mix_is_deterministic() {
        let tracks = vec![
            constant_track(0, 0.1, 4),
            constant_track(1, 0.2, 4),
            constant_track(2, 0.3, 4),
        ];
        assert_eq!(mix_tracks(&tracks, 100, 0), mix_tracks(&tracks, 100, 0));
    }
}
