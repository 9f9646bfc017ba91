use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use trackstars::config::RunConfig;
use trackstars::pipeline::{OutputPaths, Runner};
use trackstars::tracking::ConflictPolicy;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    BestDistance,
    LastInOrder,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::BestDistance => ConflictPolicy::BestDistance,
            PolicyArg::LastInOrder => ConflictPolicy::LastInOrder,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Track bright features through a clip and sonify them")]
struct Cli {
    /// Frame directory, or a video file when built with `opencv`
    input: PathBuf,

    /// YAML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overlay output: PNG directory, or video file with `opencv`
    #[arg(long, default_value = "overlay")]
    overlay: PathBuf,

    /// Mixed audio output
    #[arg(long, default_value = "tracks.wav")]
    wav: PathBuf,

    #[arg(long)]
    max_frames: Option<usize>,

    /// Override the source frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Number of tracks to sonify
    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long)]
    min_presence: Option<usize>,

    /// Minimum contiguous run length of a selected track
    #[arg(long)]
    min_run: Option<usize>,

    #[arg(long)]
    gain: Option<f32>,

    #[arg(long, value_enum)]
    conflict_policy: Option<PolicyArg>,

    /// Extractor threads
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(max_frames) = self.max_frames {
            config.max_frames = max_frames;
        }
        if self.fps.is_some() {
            config.fps = self.fps;
        }
        if self.top_k.is_some() {
            config.selection.top_k = self.top_k;
        }
        if self.min_presence.is_some() {
            config.selection.min_presence = self.min_presence;
        }
        if let Some(min_run) = self.min_run {
            config.selection.min_run = min_run;
        }
        if let Some(gain) = self.gain {
            config.sonify.gain = gain;
        }
        if let Some(policy) = self.conflict_policy {
            config.association.conflict_policy = policy.into();
        }
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let runner = Runner::new(cli.run_config()?)?;
    let outputs = OutputPaths {
        overlay: cli.overlay.clone(),
        wav: cli.wav.clone(),
    };
    let summary = runner.run_path(&cli.input, &outputs)?;

    println!(
        "{} frames ({:.3}s each), {} tracks, {} selected",
        summary.frames,
        summary.frame_duration,
        summary.tracks_total,
        summary.selected.len()
    );
    for report in &summary.selected {
        println!(
            "  {:>5}  presence {:>5}  longest run {:>5}  tones {:>4}  missing {}",
            report.score.id.to_string(),
            report.score.presence,
            report.score.longest_run,
            report.tones.len(),
            report.missing_samples
        );
        for tone in &report.tones {
            println!(
                "         frames {:>5}..{:<5}  key {:>3}  velocity {:>3}",
                tone.start_frame,
                tone.start_frame + tone.frames,
                tone.note.key,
                tone.note.velocity
            );
        }
    }
    println!(
        "Audio: {} samples, {:.2}s, peak {:.3} -> {}",
        summary.samples,
        summary.duration_secs,
        summary.peak,
        cli.wav.display()
    );
    println!("Overlay -> {}", cli.overlay.display());
    Ok(())
}
