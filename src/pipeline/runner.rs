//! End-to-end run: association, selection, colour sampling, sonification.
//!
//! Pass 1 streams the clip through the feature pipeline into the association
//! engine. After selection, pass 2 re-reads the clip to sample colours under
//! the selected tracks and render the overlay. The selected tracks are then
//! sonified in parallel, mixed in selection order and written out. Both
//! outputs are published together or not at all.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail, ensure};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::io::overlay::MARKER_COLOR;
use crate::io::{
    FrameSource, OutputStage, OverlaySink, create_sink, draw_keypoints, open_source, write_wav,
};
use crate::sonify::{MidiNote, SonifiedTrack, TrackSonifier, mix_tracks};
use crate::tracking::{
    AssociationEngine, FeaturePoint, TrackId, TrackScore, TrackSelector, TrackSet,
    sample_frame_colors,
};
use crate::vision::{BlobBriefExtractor, BruteForceMatcher, FeatureExtractor, FrameMatcher};

use super::stages::FeaturePipeline;

/// Where the two artifacts go.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    /// PNG frame directory, or a video file with the `opencv` feature.
    pub overlay: PathBuf,
    pub wav: PathBuf,
}

/// Result of the association pass.
#[derive(Debug, Clone)]
pub struct Association {
    pub tracks: TrackSet,
    pub frame_size: (u32, u32),
    pub source_fps: Option<f64>,
}

/// One tone segment of a selected track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneReport {
    pub start_frame: usize,
    pub frames: usize,
    pub note: MidiNote,
}

/// Per selected track, as reported after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub score: TrackScore,
    pub tones: Vec<ToneReport>,
    pub missing_samples: usize,
}

impl TrackReport {
    fn new(score: TrackScore, track: &SonifiedTrack) -> Result<Self> {
        ensure!(
            score.id == track.id,
            "Audio for {} reported against selected track {}",
            track.id,
            score.id
        );
        let tones = track
            .tones()
            .map(|(seg, note)| ToneReport {
                start_frame: seg.start_frame,
                frames: seg.frames,
                note,
            })
            .collect();
        Ok(Self {
            score,
            tones,
            missing_samples: track.missing_samples,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames: usize,
    pub frame_duration: f64,
    pub tracks_total: usize,
    pub selected: Vec<TrackReport>,
    pub samples: usize,
    pub duration_secs: f64,
    pub peak: f32,
}

pub struct Runner {
    config: RunConfig,
    extractor: Box<dyn FeatureExtractor>,
    matcher: Box<dyn FrameMatcher>,
}

impl Runner {
    /// Runner with the default blob/BRIEF extractor and brute-force matcher.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let extractor = Box::new(BlobBriefExtractor::new(config.detector.clone()));
        let matcher = Box::new(BruteForceMatcher::new(config.matcher.clone()));
        Ok(Self::with_collaborators(config, extractor, matcher))
    }

    pub fn with_collaborators(
        config: RunConfig,
        extractor: Box<dyn FeatureExtractor>,
        matcher: Box<dyn FrameMatcher>,
    ) -> Self {
        Self {
            config,
            extractor,
            matcher,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Pass 1: stream `source` into the association engine.
    pub fn associate(&self, source: Box<dyn FrameSource>) -> Result<Association> {
        let source_fps = source.fps();
        let mut engine = AssociationEngine::new(self.config.association.conflict_policy);
        let pipeline = FeaturePipeline::new(
            self.extractor.as_ref(),
            self.matcher.as_ref(),
            self.config.pipeline,
            self.config.max_frames,
        );

        let outcome = pipeline.run(source, |msg| {
            engine.process_frame(msg.index, msg.keypoints, &msg.matches)?;
            Ok(())
        })?;

        let Some(frame_size) = outcome.frame_size else {
            bail!("Input contains no frames");
        };
        let tracks = engine.finish();
        info!(
            "Associated {} frames into {} tracks ({:?})",
            tracks.frame_count(),
            tracks.len(),
            self.config.association.conflict_policy
        );
        Ok(Association {
            tracks,
            frame_size,
            source_fps,
        })
    }

    /// Pass 2: sample colours for `selected` and write the overlay.
    ///
    /// Colours are sampled before markers are drawn. Returns the number of
    /// frames re-read; a shorter second read leaves the tail unsampled.
    pub fn sample_and_render(
        &self,
        mut source: Box<dyn FrameSource>,
        tracks: &mut TrackSet,
        selected: &[TrackId],
        sink: &mut dyn OverlaySink,
    ) -> Result<usize> {
        let frame_count = tracks.frame_count();
        let mut missing = 0;
        let mut frame_index = 0;
        while frame_index < frame_count {
            let Some(mut frame) = source
                .next_frame()
                .with_context(|| format!("Failed to re-read frame {}", frame_index))?
            else {
                break;
            };
            missing += sample_frame_colors(tracks, selected, frame_index, &frame).missing;

            let keypoints: Vec<FeaturePoint> = selected
                .iter()
                .filter_map(|&id| tracks.get(id))
                .filter_map(|t| t.keypoint(frame_index).copied())
                .collect();
            draw_keypoints(&mut frame, &keypoints, MARKER_COLOR);
            sink.write_frame(frame_index, &frame)?;
            frame_index += 1;
        }
        sink.finish()?;

        if frame_index < frame_count {
            warn!(
                "Second pass ended after {} of {} frames; remaining frames are silent",
                frame_index, frame_count
            );
        }
        if missing > 0 {
            debug!("{} keypoints fell outside their frame", missing);
        }
        Ok(frame_index)
    }

    /// Full run. `open` is called twice, once per pass.
    pub fn run<F>(&self, open: F, outputs: &OutputPaths) -> Result<RunSummary>
    where
        F: Fn() -> Result<Box<dyn FrameSource>>,
    {
        let started = Instant::now();
        let Association {
            mut tracks,
            frame_size,
            source_fps,
        } = self.associate(open()?)?;

        let selection = TrackSelector::new(self.config.selection.clone()).select(&tracks);
        let selected: Vec<TrackId> = selection.iter().map(|s| s.id).collect();
        info!("Selected {} of {} tracks", selected.len(), tracks.len());
        for score in &selection {
            debug!(
                "{}: presence {}, longest run {}",
                score.id, score.presence, score.longest_run
            );
        }

        let frame_duration = self.config.frame_duration(source_fps);
        let mut stage = OutputStage::new();
        let overlay_path = stage.stage(&outputs.overlay)?;
        let wav_path = stage.stage(&outputs.wav)?;

        let (width, height) = frame_size;
        let mut sink = create_sink(&overlay_path, 1.0 / frame_duration, width, height)?;
        self.sample_and_render(open()?, &mut tracks, &selected, sink.as_mut())?;
        drop(sink);

        let sonifier = TrackSonifier::new(self.config.sonify.clone(), frame_duration, width);
        let sonified = sonifier.sonify_all(&tracks, &selected)?;
        let selected_reports = selection
            .iter()
            .zip(&sonified)
            .map(|(score, track)| TrackReport::new(*score, track))
            .collect::<Result<Vec<_>>>()?;
        let bus = mix_tracks(
            &sonified,
            sonifier.sample_rate(),
            sonifier.total_samples(tracks.frame_count()),
        );
        write_wav(&wav_path, &bus)?;
        stage.commit()?;

        let summary = RunSummary {
            frames: tracks.frame_count(),
            frame_duration,
            tracks_total: tracks.len(),
            selected: selected_reports,
            samples: bus.len(),
            duration_secs: bus.duration_secs(),
            peak: bus.peak(),
        };
        info!(
            "Wrote {} and {} in {:.2}s",
            outputs.overlay.display(),
            outputs.wav.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Full run on a frame directory or video file.
    pub fn run_path(&self, input: &Path, outputs: &OutputPaths) -> Result<RunSummary> {
        self.run(|| open_source(input), outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonify::{Segment, SegmentKind, StereoBuffer};

    fn sonified(id: usize) -> SonifiedTrack {
        let note = MidiNote {
            key: 60,
            velocity: 100,
        };
        let tone = |start_frame, frames| Segment {
            start_frame,
            frames,
            kind: SegmentKind::Tone {
                frequency: 440.0,
                pan: 0.0,
                note,
            },
        };
        SonifiedTrack {
            id: TrackId::new(id),
            segments: vec![
                tone(0, 3),
                Segment {
                    start_frame: 3,
                    frames: 2,
                    kind: SegmentKind::Silence,
                },
                tone(5, 1),
            ],
            samples: StereoBuffer::new(8000),
            missing_samples: 1,
        }
    }

    fn score(id: usize) -> TrackScore {
        TrackScore {
            id: TrackId::new(id),
            presence: 4,
            longest_run: 3,
        }
    }

    #[test]
    fn test_report_lists_tone_notes() {
        let report = TrackReport::new(score(2), &sonified(2)).unwrap();
        let spans: Vec<(usize, usize)> = report
            .tones
            .iter()
            .map(|t| (t.start_frame, t.frames))
            .collect();
        assert_eq!(spans, vec![(0, 3), (5, 1)]);
        assert!(report.tones.iter().all(|t| t.note.key == 60));
        assert_eq!(report.missing_samples, 1);
    }

    #[test]
    fn test_report_rejects_mismatched_track() {
        let err = TrackReport::new(score(1), &sonified(2)).unwrap_err();
        assert!(err.to_string().contains("T2"));
    }
}
