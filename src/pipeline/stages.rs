//! Bounded, staged feature extraction.
//!
//! ```text
//! reader ──► extractor workers (N) ──► reorder barrier + matcher ──► caller
//! ```
//!
//! Every channel is bounded by `channel_capacity`. Workers may finish out of
//! order; the barrier holds results in a `BTreeMap` until the next expected
//! index arrives and only then matches it against the previous frame. The
//! caller therefore sees transitions strictly in frame order.
//!
//! The reader takes a credit before each frame and the barrier hands it back
//! once that frame leaves in order. At most `channel_capacity + workers`
//! frames sit between the two, so one slow frame cannot make the barrier
//! buffer the rest of the clip.
//!
//! Stages run inside a thread scope. When the caller stops consuming
//! (error or early return) its receiver is dropped, each upstream send
//! fails in turn, and the scope joins every thread before returning.

use std::collections::BTreeMap;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::io::FrameSource;
use crate::tracking::FeatureSet;
use crate::vision::{FeatureExtractor, FrameMatcher};

use super::messages::{FeatureMsg, FrameMsg, TransitionMsg};

/// What the extraction pass saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub frames: usize,
    pub frame_size: Option<(u32, u32)>,
}

pub struct FeaturePipeline<'a> {
    extractor: &'a dyn FeatureExtractor,
    matcher: &'a dyn FrameMatcher,
    config: PipelineConfig,
    max_frames: usize,
}

impl<'a> FeaturePipeline<'a> {
    pub fn new(
        extractor: &'a dyn FeatureExtractor,
        matcher: &'a dyn FrameMatcher,
        config: PipelineConfig,
        max_frames: usize,
    ) -> Self {
        Self {
            extractor,
            matcher,
            config,
            max_frames,
        }
    }

    /// Drive `source` through the stages, handing each transition to
    /// `on_transition` on the calling thread.
    pub fn run<F>(&self, source: Box<dyn FrameSource>, mut on_transition: F) -> Result<StageOutcome>
    where
        F: FnMut(TransitionMsg) -> Result<()>,
    {
        let capacity = self.config.channel_capacity.max(1);
        let workers = self.config.workers.max(1);
        let window = capacity + workers;
        let extractor = self.extractor;
        let matcher = self.matcher;
        let max_frames = self.max_frames;

        thread::scope(|s| {
            let (frame_tx, frame_rx) = bounded::<Result<FrameMsg>>(capacity);
            let (feature_tx, feature_rx) = bounded::<Result<FeatureMsg>>(capacity);
            let (transition_tx, transition_rx) = bounded::<Result<TransitionMsg>>(capacity);
            let (credit_tx, credit_rx) = bounded::<()>(window);
            for _ in 0..window {
                credit_tx.send(()).context("Failed to prime frame credits")?;
            }

            s.spawn(move || read_frames(source, max_frames, credit_rx, frame_tx));
            for _ in 0..workers {
                let rx = frame_rx.clone();
                let tx = feature_tx.clone();
                s.spawn(move || extract_features(extractor, rx, tx));
            }
            drop(frame_rx);
            drop(feature_tx);
            s.spawn(move || reorder_and_match(matcher, feature_rx, credit_tx, transition_tx));

            let mut outcome = StageOutcome::default();
            for msg in transition_rx {
                let msg = msg?;
                outcome.frames = msg.index + 1;
                outcome.frame_size.get_or_insert(msg.frame_size);
                on_transition(msg)?;
            }
            info!("Feature pipeline finished after {} frames", outcome.frames);
            Ok(outcome)
        })
    }
}

fn read_frames(
    mut source: Box<dyn FrameSource>,
    max_frames: usize,
    credits: Receiver<()>,
    tx: Sender<Result<FrameMsg>>,
) {
    for index in 0..max_frames {
        // Fails once the barrier has gone away.
        if credits.recv().is_err() {
            return;
        }
        match source.next_frame() {
            Ok(Some(image)) => {
                if tx.send(Ok(FrameMsg { index, image })).is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("End of stream after {} frames", index);
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e.context(format!("Failed to read frame {}", index))));
                return;
            }
        }
    }
    info!("Stopped reading at max_frames = {}", max_frames);
}

fn extract_features(
    extractor: &dyn FeatureExtractor,
    rx: Receiver<Result<FrameMsg>>,
    tx: Sender<Result<FeatureMsg>>,
) {
    for msg in rx {
        let result = msg.and_then(|frame| {
            let features = extractor
                .extract(&frame.image, frame.index)
                .with_context(|| format!("Feature extraction failed on frame {}", frame.index))?;
            Ok(FeatureMsg {
                index: frame.index,
                frame_size: frame.image.dimensions(),
                features,
            })
        });
        let failed = result.is_err();
        if tx.send(result).is_err() || failed {
            return;
        }
    }
}

fn reorder_and_match(
    matcher: &dyn FrameMatcher,
    rx: Receiver<Result<FeatureMsg>>,
    credits: Sender<()>,
    tx: Sender<Result<TransitionMsg>>,
) {
    let mut pending: BTreeMap<usize, FeatureMsg> = BTreeMap::new();
    let mut next = 0;
    let mut prev: Option<FeatureSet> = None;

    for msg in rx {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        pending.insert(msg.index, msg);

        while let Some(ready) = pending.remove(&next) {
            let matches = prev
                .as_ref()
                .map(|p| matcher.match_frames(p, &ready.features))
                .unwrap_or_default();
            debug!(
                "Frame {}: {} features, {} matches",
                next,
                ready.features.len(),
                matches.len()
            );
            let transition = TransitionMsg {
                index: next,
                frame_size: ready.frame_size,
                keypoints: ready.features.keypoints.clone(),
                matches,
            };
            // The previous frame's descriptors are released here.
            prev = Some(ready.features);
            let _ = credits.send(());
            if tx.send(Ok(transition)).is_err() {
                return;
            }
            next += 1;
        }
    }

    if !pending.is_empty() {
        warn!(
            "{} frames stuck behind missing frame {}",
            pending.len(),
            next
        );
    }
}
