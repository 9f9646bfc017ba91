//! Track sonifier: turns a Track's sparse per-frame colour samples into a
//! continuous stereo signal.
//!
//! Frames 0..N-1 are split into maximal runs sharing the same active state
//! (colour sample present or not). Inactive runs become silence, active runs
//! become sine tones whose pitch follows the sampled hue and whose stereo
//! position follows the keypoint's x coordinate. Every frame lasts exactly
//! one frame duration, so the signal always spans N frame durations.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tracking::{Track, TrackId, TrackSet};

use super::color::{MidiNote, WavelengthMapper};
use super::signal::{SineOscillator, StereoBuffer, frame_to_sample};

/// Which colour drives an active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneSampling {
    /// The first frame's colour is held for the whole run.
    #[default]
    RunStart,
    /// Every frame uses its own colour.
    PerFrame,
}

/// How the keypoint's horizontal position pans the tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanMode {
    /// Pan each tone segment by its representative keypoint.
    #[default]
    PerRun,
    /// One pan for the whole track, from the mean x over active frames.
    Uniform,
    /// No panning.
    Center,
}

/// Synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonifyConfig {
    pub sample_rate: u32,
    pub gain: f32,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub tone_sampling: ToneSampling,
    pub pan: PanMode,
}

impl Default for SonifyConfig {
    fn default() -> Self {
        let span = WavelengthMapper::default();
        Self {
            sample_rate: 44100,
            gain: 0.2,
            min_frequency: span.min_frequency,
            max_frequency: span.max_frequency,
            tone_sampling: ToneSampling::RunStart,
            pan: PanMode::PerRun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    Silence,
    Tone {
        frequency: f64,
        pan: f32,
        note: MidiNote,
    },
}

/// A span of consecutive frames rendered with one sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start_frame: usize,
    pub frames: usize,
    pub kind: SegmentKind,
}

impl Segment {
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.frames
    }

    pub fn duration(&self, frame_duration: f64) -> f64 {
        self.frames as f64 * frame_duration
    }

    pub fn is_silence(&self) -> bool {
        matches!(self.kind, SegmentKind::Silence)
    }
}

/// Signal and bookkeeping for one sonified track.
#[derive(Debug, Clone)]
pub struct SonifiedTrack {
    pub id: TrackId,
    pub segments: Vec<Segment>,
    pub samples: StereoBuffer,
    /// Frames with a keypoint but no colour sample, rendered as silence.
    pub missing_samples: usize,
}

impl SonifiedTrack {
    /// Tone segments with the piano note each one maps to.
    pub fn tones(&self) -> impl Iterator<Item = (&Segment, MidiNote)> {
        self.segments.iter().filter_map(|seg| match seg.kind {
            SegmentKind::Tone { note, .. } => Some((seg, note)),
            SegmentKind::Silence => None,
        })
    }
}

pub struct TrackSonifier {
    config: SonifyConfig,
    mapper: WavelengthMapper,
    frame_duration: f64,
    frame_width: u32,
}

impl TrackSonifier {
    /// `frame_duration` is 1/fps; `frame_width` is the image width used for panning.
    pub fn new(config: SonifyConfig, frame_duration: f64, frame_width: u32) -> Self {
        let mapper = WavelengthMapper::new(config.min_frequency, config.max_frequency);
        Self {
            config,
            mapper,
            frame_duration,
            frame_width,
        }
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Number of samples covering `frame_count` frames.
    pub fn total_samples(&self, frame_count: usize) -> usize {
        frame_to_sample(frame_count, self.frame_duration, self.config.sample_rate)
    }

    fn pan_for_x(&self, x: f32) -> f32 {
        if self.frame_width == 0 {
            return 0.0;
        }
        (2.0 * x / self.frame_width as f32 - 1.0).clamp(-1.0, 1.0)
    }

    fn uniform_pan(&self, track: &Track, frame_count: usize) -> f32 {
        let xs: Vec<f32> = (0..frame_count)
            .filter(|&f| track.color_sample(f).is_some())
            .filter_map(|f| track.keypoint(f).map(|kp| kp.x()))
            .collect();
        if xs.is_empty() {
            return 0.0;
        }
        self.pan_for_x(xs.iter().sum::<f32>() / xs.len() as f32)
    }

    /// Tone parameters for an active frame.
    fn tone_at(&self, track: &Track, frame: usize, uniform_pan: f32) -> Option<SegmentKind> {
        let color = track.color_sample(frame)?;
        let pan = match self.config.pan {
            PanMode::PerRun => track.keypoint(frame).map_or(0.0, |kp| self.pan_for_x(kp.x())),
            PanMode::Uniform => uniform_pan,
            PanMode::Center => 0.0,
        };
        Some(SegmentKind::Tone {
            frequency: self.mapper.frequency(color),
            pan,
            note: WavelengthMapper::midi_note(color),
        })
    }

    /// Split frames `0..frame_count` into contiguous silence / tone segments.
    ///
    /// Returns the segments and the number of frames that had a keypoint but
    /// no colour sample.
    pub fn segments(&self, track: &Track, frame_count: usize) -> (Vec<Segment>, usize) {
        let missing = (0..frame_count)
            .filter(|&f| track.keypoint(f).is_some() && track.color_sample(f).is_none())
            .count();
        let uniform_pan = match self.config.pan {
            PanMode::Uniform => self.uniform_pan(track, frame_count),
            _ => 0.0,
        };

        let mut segments: Vec<Segment> = Vec::new();
        let mut frame = 0;
        while frame < frame_count {
            let start = frame;
            match self.tone_at(track, frame, uniform_pan) {
                None => {
                    while frame < frame_count && track.color_sample(frame).is_none() {
                        frame += 1;
                    }
                    segments.push(Segment {
                        start_frame: start,
                        frames: frame - start,
                        kind: SegmentKind::Silence,
                    });
                }
                Some(first) => {
                    while frame < frame_count && track.color_sample(frame).is_some() {
                        frame += 1;
                    }
                    match self.config.tone_sampling {
                        ToneSampling::RunStart => segments.push(Segment {
                            start_frame: start,
                            frames: frame - start,
                            kind: first,
                        }),
                        ToneSampling::PerFrame => {
                            for f in start..frame {
                                let Some(kind) = self.tone_at(track, f, uniform_pan) else {
                                    continue;
                                };
                                match segments.last_mut() {
                                    Some(last) if last.kind == kind && last.end_frame() == f => {
                                        last.frames += 1;
                                    }
                                    _ => segments.push(Segment {
                                        start_frame: f,
                                        frames: 1,
                                        kind,
                                    }),
                                }
                            }
                        }
                    }
                }
            }
        }

        (segments, missing)
    }

    /// Render contiguous segments into a stereo buffer.
    pub fn render(&self, segments: &[Segment]) -> StereoBuffer {
        let sample_rate = self.config.sample_rate;
        let total = segments
            .last()
            .map_or(0, |s| frame_to_sample(s.end_frame(), self.frame_duration, sample_rate));
        let mut out = StereoBuffer::with_capacity(sample_rate, total);
        let mut osc = SineOscillator::new();

        for seg in segments {
            let start = frame_to_sample(seg.start_frame, self.frame_duration, sample_rate);
            let end = frame_to_sample(seg.end_frame(), self.frame_duration, sample_rate);
            let len = end - start;
            match seg.kind {
                SegmentKind::Silence => {
                    osc.reset();
                    out.extend_silence(len);
                }
                SegmentKind::Tone { frequency, pan, .. } => {
                    osc.render(frequency, self.config.gain, pan, len, &mut out);
                }
            }
        }

        out
    }

    pub fn sonify(&self, track: &Track, frame_count: usize) -> SonifiedTrack {
        let (segments, missing_samples) = self.segments(track, frame_count);
        if missing_samples > 0 {
            debug!(
                "{}: {} frames without colour sample rendered as silence",
                track.id, missing_samples
            );
        }
        let samples = self.render(&segments);
        SonifiedTrack {
            id: track.id,
            segments,
            samples,
            missing_samples,
        }
    }

    /// Sonify the selected tracks in parallel. Output order matches `selected`.
    ///
    /// Fails if an id is not in `tracks`.
    pub fn sonify_all(
        &self,
        tracks: &TrackSet,
        selected: &[TrackId],
    ) -> Result<Vec<SonifiedTrack>> {
        let frame_count = tracks.frame_count();
        selected
            .par_iter()
            .map(|&id| {
                let track = tracks
                    .get(id)
                    .with_context(|| format!("Selected track {} is not in the track set", id))?;
                Ok(self.sonify(track, frame_count))
            })
            .collect()
    }
}
