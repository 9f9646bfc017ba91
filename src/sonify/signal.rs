//! Stereo sample buffers and tone generation.

use std::f64::consts::{FRAC_PI_4, TAU};

/// Planar stereo buffer of f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_capacity(sample_rate, 0)
    }

    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            left: Vec::with_capacity(capacity),
            right: Vec::with_capacity(capacity),
            sample_rate,
        }
    }

    pub fn silence(sample_rate: u32, len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            sample_rate,
        }
    }

    /// Number of sample frames (per channel).
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn push(&mut self, left: f32, right: f32) {
        self.left.push(left);
        self.right.push(right);
    }

    pub fn extend_silence(&mut self, len: usize) {
        self.left.resize(self.left.len() + len, 0.0);
        self.right.resize(self.right.len() + len, 0.0);
    }

    /// Shorten both channels to `len` samples.
    pub fn truncate(&mut self, len: usize) {
        self.left.truncate(len);
        self.right.truncate(len);
    }

    /// Add `other` sample-by-sample over the common length.
    pub fn add_assign(&mut self, other: &StereoBuffer) {
        for (dst, src) in self.left.iter_mut().zip(&other.left) {
            *dst += *src;
        }
        for (dst, src) in self.right.iter_mut().zip(&other.right) {
            *dst += *src;
        }
    }

    /// Largest absolute sample over both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Interleaved L/R iterator, as written to an audio file.
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
    }
}

/// Sample index at which `frame` starts.
///
/// Boundaries come from the absolute frame position rather than from summed
/// segment lengths, so rounding never accumulates.
pub fn frame_to_sample(frame: usize, frame_duration: f64, sample_rate: u32) -> usize {
    (frame as f64 * frame_duration * f64::from(sample_rate)).round() as usize
}

/// Constant-power gains for a pan position in [-1, 1] (-1 = hard left).
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (f64::from(pan.clamp(-1.0, 1.0)) + 1.0) * FRAC_PI_4;
    (angle.cos() as f32, angle.sin() as f32)
}

/// Phase-continuous sine generator.
#[derive(Debug, Clone, Default)]
pub struct SineOscillator {
    /// Phase in cycles, [0, 1).
    phase: f64,
}

impl SineOscillator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Append `len` samples of a sine at `frequency`, scaled by `gain` and panned.
    pub fn render(
        &mut self,
        frequency: f64,
        gain: f32,
        pan: f32,
        len: usize,
        out: &mut StereoBuffer,
    ) {
        let step = frequency / f64::from(out.sample_rate);
        let (gl, gr) = pan_gains(pan);
        for _ in 0..len {
            let s = (self.phase * TAU).sin() as f32 * gain;
            out.push(s * gl, s * gr);
            self.phase = (self.phase + step).fract();
        }
    }
}
