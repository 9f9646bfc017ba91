//! Run configuration.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! is a valid configuration. CLI flags override individual fields after
//! loading.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sonify::SonifyConfig;
use crate::tracking::{ConflictPolicy, SelectionConfig};
use crate::vision::{DetectorConfig, MatcherConfig};

/// Frame duration used when neither the config nor the source gives an FPS.
pub const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Frames processed at most.
    pub max_frames: usize,
    /// Fixed frame rate. `None` uses the source's rate.
    pub fps: Option<f64>,
    pub association: AssociationConfig,
    pub selection: SelectionConfig,
    pub sonify: SonifyConfig,
    pub detector: DetectorConfig,
    pub matcher: MatcherConfig,
    pub pipeline: PipelineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_frames: 900,
            fps: None,
            association: AssociationConfig::default(),
            selection: SelectionConfig::default(),
            sonify: SonifyConfig::default(),
            detector: DetectorConfig::default(),
            matcher: MatcherConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    pub conflict_policy: ConflictPolicy,
}

/// Feature extraction stage sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extractor threads.
    pub workers: usize,
    /// Capacity of every inter-stage channel, in frames.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_capacity: 8,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open config {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Frame duration in seconds for a source reporting `source_fps`.
    pub fn frame_duration(&self, source_fps: Option<f64>) -> f64 {
        let fps = self
            .fps
            .or(source_fps.filter(|f| f.is_finite() && *f > 0.0))
            .unwrap_or(FALLBACK_FPS);
        1.0 / fps
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_frames > 0, "max_frames must be > 0");
        if let Some(fps) = self.fps {
            anyhow::ensure!(fps.is_finite() && fps > 0.0, "fps must be > 0");
        }
        if let Some(top_k) = self.selection.top_k {
            anyhow::ensure!(top_k > 0, "selection.top_k must be > 0 when set");
        }
        anyhow::ensure!(self.sonify.sample_rate > 0, "sonify.sample_rate must be > 0");
        anyhow::ensure!(
            self.sonify.gain.is_finite() && self.sonify.gain >= 0.0,
            "sonify.gain must be >= 0"
        );
        anyhow::ensure!(
            self.sonify.min_frequency > 0.0,
            "sonify.min_frequency must be > 0"
        );
        anyhow::ensure!(
            self.sonify.max_frequency >= self.sonify.min_frequency,
            "sonify.max_frequency must be >= sonify.min_frequency"
        );
        anyhow::ensure!(
            self.sonify.max_frequency < f64::from(self.sonify.sample_rate) / 2.0,
            "sonify.max_frequency must be below the Nyquist frequency"
        );
        anyhow::ensure!(self.detector.channel < 3, "detector.channel must be 0, 1 or 2");
        anyhow::ensure!(self.detector.min_area > 0, "detector.min_area must be > 0");
        anyhow::ensure!(
            self.detector.max_features > 0,
            "detector.max_features must be > 0"
        );
        if let Some(max) = self.matcher.max_displacement {
            anyhow::ensure!(max >= 0.0, "matcher.max_displacement must be >= 0");
        }
        anyhow::ensure!(self.pipeline.workers > 0, "pipeline.workers must be > 0");
        anyhow::ensure!(
            self.pipeline.channel_capacity > 0,
            "pipeline.channel_capacity must be > 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonify::ToneSampling;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RunConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.max_frames, 900);
        assert_eq!(config.selection.top_k, Some(20));
        assert_eq!(config.sonify.sample_rate, 44100);
    }

    #[test]
    fn test_partial_override() {
        let yaml = "
max_frames: 120
fps: 25
association:
  conflict_policy: last_in_order
selection:
  top_k: null
  min_run: 10
sonify:
  tone_sampling: per_frame
";
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_frames, 120);
        assert_eq!(config.fps, Some(25.0));
        assert_eq!(config.association.conflict_policy, ConflictPolicy::LastInOrder);
        assert_eq!(config.selection.top_k, None);
        assert_eq!(config.selection.min_run, 10);
        assert_eq!(config.sonify.tone_sampling, ToneSampling::PerFrame);
        assert_eq!(config.sonify.gain, 0.2);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RunConfig::from_yaml_str("max_frames: 0").is_err());
        assert!(RunConfig::from_yaml_str("fps: -1").is_err());
        assert!(RunConfig::from_yaml_str("pipeline: {workers: 0}").is_err());
        assert!(RunConfig::from_yaml_str("sonify: {max_frequency: 30000}").is_err());
        assert!(RunConfig::from_yaml_str("detector: {channel: 3}").is_err());
    }

    #[test]
    fn test_frame_duration_precedence() {
        let mut config = RunConfig::default();
        assert_eq!(config.frame_duration(None), 1.0 / FALLBACK_FPS);
        assert_eq!(config.frame_duration(Some(0.0)), 1.0 / FALLBACK_FPS);
        assert_eq!(config.frame_duration(Some(50.0)), 0.02);
        config.fps = Some(10.0);
        assert_eq!(config.frame_duration(Some(50.0)), 0.1);
    }
}
