// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Live frame sources for unbounded runs.
//!
//! A source yields at most one frame per pass. `None` means the source is
//! finished, which ends the run the same way a cancellation would.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::errors::PipelineError;
use crate::graph::{DataKind, DepthImage, Inputs, NodeInterface, Outputs, PortSpec};
use crate::observability::messages::operators::SensorExhausted;
use crate::observability::messages::StructuredLog;
use crate::store::read_png;
use crate::traits::{Node, NodeStatus};

use super::reader::{DEPTH_PORT, FRAME_NUMBER_PORT, IMAGE_PORT};

/// One captured colour frame with its optional depth map.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_number: i64,
    pub image: Arc<RgbImage>,
    pub depth: Option<Arc<DepthImage>>,
}

#[async_trait]
pub trait FrameSource: Send {
    fn name(&self) -> &'static str;

    async fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;
}

/// Replays `NNNN_image.png` / `NNNN_depth.png` pairs from a directory at a
/// fixed frame rate, optionally starting over at the end.
pub struct DirectorySensor {
    frames: Vec<(PathBuf, Option<PathBuf>)>,
    period: Duration,
    looping: bool,
    cursor: usize,
    produced: i64,
    ticker: Option<Interval>,
}

impl DirectorySensor {
    pub fn open(dir: impl AsRef<Path>, fps: f64, looping: bool) -> Result<Self, PipelineError> {
        let dir = dir.as_ref();
        if !(fps.is_finite() && fps > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "sensor frame rate must be positive, got {}",
                fps
            )));
        }
        let entries = std::fs::read_dir(dir).map_err(|e| {
            PipelineError::Configuration(format!("cannot open sensor directory {}: {}", dir.display(), e))
        })?;

        let mut images: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_image.png"))
            })
            .collect();
        images.sort();
        if images.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "no *_image.png frames in {}",
                dir.display()
            )));
        }

        let frames = images
            .into_iter()
            .map(|image| {
                let depth = image
                    .to_str()
                    .map(|s| PathBuf::from(s.replace("_image.png", "_depth.png")))
                    .filter(|p| p.exists());
                (image, depth)
            })
            .collect();

        Ok(Self {
            frames,
            period: Duration::from_secs_f64(1.0 / fps),
            looping,
            cursor: 0,
            produced: 0,
            ticker: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FrameSource for DirectorySensor {
    fn name(&self) -> &'static str {
        "directory_sensor"
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;

        let (image_path, depth_path) = &self.frames[self.cursor];
        let image = read_png(image_path)
            .await?
            .ok_or_else(|| PipelineError::NotFound(image_path.display().to_string()))?
            .to_rgb8();
        let depth = match depth_path {
            Some(path) => read_png(path).await?.map(|d| Arc::new(d.to_luma16())),
            None => None,
        };

        self.cursor += 1;
        let frame_number = self.produced;
        self.produced += 1;
        Ok(Some(Frame {
            frame_number,
            image: Arc::new(image),
            depth,
        }))
    }
}

/// Frames pushed from elsewhere in the process, e.g. a camera driver task.
pub struct ChannelSensor {
    receiver: mpsc::Receiver<Frame>,
}

impl ChannelSensor {
    pub fn new(receiver: mpsc::Receiver<Frame>) -> Self {
        Self { receiver }
    }

    /// A sensor and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl FrameSource for ChannelSensor {
    fn name(&self) -> &'static str {
        "channel_sensor"
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        Ok(self.receiver.recv().await)
    }
}

/// Graph node publishing one frame from a [`FrameSource`] per pass.
pub struct SensorSource {
    source: Box<dyn FrameSource>,
    frames: u64,
}

impl SensorSource {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self { source, frames: 0 }
    }
}

#[async_trait]
impl Node for SensorSource {
    fn name(&self) -> &'static str {
        "sensor_source"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new()
            .output(PortSpec::new(IMAGE_PORT, DataKind::Image))
            .output(PortSpec::new(DEPTH_PORT, DataKind::Depth))
            .output(PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber))
    }

    async fn process(
        &mut self,
        _inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        let Some(frame) = self.source.next_frame().await? else {
            SensorExhausted {
                sensor: self.source.name(),
                frames: self.frames,
            }
            .log();
            return Ok(NodeStatus::Exhausted);
        };
        self.frames += 1;
        outputs.set(IMAGE_PORT, frame.image);
        if let Some(depth) = frame.depth {
            outputs.set(DEPTH_PORT, depth);
        }
        outputs.set(FRAME_NUMBER_PORT, frame.frame_number);
        Ok(NodeStatus::Ready)
    }
}
