// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{GrayImage, Luma, RgbImage};

use crate::errors::PipelineError;
use crate::graph::{DataKind, DepthImage, Inputs, NodeInterface, Outputs, PortSpec};
use crate::mmod::TrainingState;
use crate::observability::messages::operators::{EmptyMaskSkipped, TemplateLearned, ViewNotLearned};
use crate::observability::messages::StructuredLog;
use crate::traits::{Node, NodeStatus};

use super::reader::{DEPTH_PORT, FRAME_NUMBER_PORT, IMAGE_PORT, MASK_PORT};

pub const FILTERS_PORT: &str = "filters";
pub const OBJECTS_PORT: &str = "objects";
pub const CORRESPONDENCES_PORT: &str = "correspondences";

/// Accumulates templates for one object across the passes of a run.
///
/// Depth and mask are optional ports; whether their absence is fatal is
/// decided by how they are wired. Each pass publishes immutable snapshots of
/// the learned state, so writers never observe a set while it changes.
pub struct TrainerNode {
    state: TrainingState,
    templates: Arc<AtomicUsize>,
}

impl TrainerNode {
    pub fn new(state: TrainingState) -> Self {
        let templates = Arc::new(AtomicUsize::new(state.template_count()));
        Self { state, templates }
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Live template count, readable after the node has moved into a graph.
    pub fn template_counter(&self) -> Arc<AtomicUsize> {
        self.templates.clone()
    }

    fn publish(&self, outputs: &mut Outputs) {
        self.templates
            .store(self.state.template_count(), Ordering::SeqCst);
        outputs.set(FILTERS_PORT, self.state.filters());
        outputs.set(OBJECTS_PORT, self.state.objects());
        outputs.set(CORRESPONDENCES_PORT, self.state.correspondences());
    }
}

/// Mask pixels that are set and, when depth is known, have a reading.
fn effective_mask(
    dims: (u32, u32),
    mask: Option<&GrayImage>,
    depth: Option<&DepthImage>,
) -> GrayImage {
    GrayImage::from_fn(dims.0, dims.1, |x, y| {
        let in_mask = mask.map_or(true, |m| m.get_pixel(x, y)[0] != 0);
        let has_depth = depth.map_or(true, |d| d.get_pixel(x, y)[0] != 0);
        Luma([if in_mask && has_depth { 255 } else { 0 }])
    })
}

#[async_trait]
impl Node for TrainerNode {
    fn name(&self) -> &'static str {
        "trainer"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new()
            .input(PortSpec::new(IMAGE_PORT, DataKind::Image))
            .input(PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber))
            .input(PortSpec::new(DEPTH_PORT, DataKind::Depth).optional())
            .input(PortSpec::new(MASK_PORT, DataKind::Mask).optional())
            .output(PortSpec::new(FILTERS_PORT, DataKind::Filters))
            .output(PortSpec::new(OBJECTS_PORT, DataKind::Objects))
            .output(PortSpec::new(CORRESPONDENCES_PORT, DataKind::Correspondences))
    }

    async fn process(
        &mut self,
        inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        let image: Arc<RgbImage> = inputs.require(IMAGE_PORT)?;
        let frame_number: i64 = inputs.require(FRAME_NUMBER_PORT)?;
        let depth: Option<Arc<DepthImage>> = inputs.get_as(DEPTH_PORT);
        let mask: Option<Arc<GrayImage>> = inputs.get_as(MASK_PORT);

        let dims = image.dimensions();
        if let Some(d) = &depth {
            if d.dimensions() != dims {
                return Err(PipelineError::invalid_input(
                    inputs.node(),
                    format!("depth is {:?} but image is {:?}", d.dimensions(), dims),
                ));
            }
        }
        if let Some(m) = &mask {
            if m.dimensions() != dims {
                return Err(PipelineError::invalid_input(
                    inputs.node(),
                    format!("mask is {:?} but image is {:?}", m.dimensions(), dims),
                ));
            }
        }

        let mask = effective_mask(dims, mask.as_deref(), depth.as_deref());
        if mask.pixels().all(|p| p[0] == 0) {
            EmptyMaskSkipped {
                object_id: self.state.object_id(),
                frame_number,
            }
            .log();
            self.publish(outputs);
            return Ok(NodeStatus::Ready);
        }

        let outcome = self.state.observe(frame_number, &image, &mask);
        match outcome.template_id {
            Some(template_id) => TemplateLearned {
                object_id: self.state.object_id(),
                frame_number,
                template_id,
                best_score: outcome.best_score,
                template_count: self.state.template_count(),
            }
            .log(),
            None => ViewNotLearned {
                object_id: self.state.object_id(),
                frame_number,
                best_score: outcome.best_score,
            }
            .log(),
        }

        self.publish(outputs);
        Ok(NodeStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::graph::Value;
    use crate::mmod::{ObjectSet, TrainParams};
    use crate::test_support::square_scene;

    fn trainer() -> TrainerNode {
        TrainerNode::new(TrainingState::new("mug", TrainParams { thresh_learn: 0.0 }))
    }

    fn inputs_for(image: RgbImage, mask: Option<GrayImage>, depth: Option<DepthImage>) -> Inputs {
        let mut inputs = Inputs::new("trainer");
        inputs.push(IMAGE_PORT, Value::from(Arc::new(image)));
        inputs.push(FRAME_NUMBER_PORT, Value::FrameNumber(1));
        if let Some(mask) = mask {
            inputs.push(MASK_PORT, Value::from(Arc::new(mask)));
        }
        if let Some(depth) = depth {
            inputs.push(DEPTH_PORT, Value::from(Arc::new(depth)));
        }
        inputs
    }

    #[tokio::test]
    async fn learns_and_publishes_snapshots() {
        let (image, mask) = square_scene();
        let mut node = trainer();
        let mut outputs = Outputs::new();
        node.process(&inputs_for(image, Some(mask), None), &mut outputs)
            .await
            .unwrap();

        let objects: Arc<ObjectSet> = match outputs.get(OBJECTS_PORT) {
            Some(Value::Objects(o)) => o.clone(),
            other => panic!("unexpected output {:?}", other),
        };
        assert_eq!(objects.templates("mug").len(), 1);
        assert_eq!(outputs.len(), 3);
    }

    #[tokio::test]
    async fn zero_depth_empties_the_mask() {
        let (image, mask) = square_scene();
        let depth = DepthImage::new(image.width(), image.height());
        let mut node = trainer();
        let mut outputs = Outputs::new();
        node.process(&inputs_for(image, Some(mask), Some(depth)), &mut outputs)
            .await
            .unwrap();
        assert_eq!(node.state().template_count(), 0);
        assert_eq!(outputs.len(), 3, "state is published even when nothing is learned");
    }

    #[tokio::test]
    async fn mismatched_mask_is_invalid_input() {
        let (image, _) = square_scene();
        let mut node = trainer();
        let err = node
            .process(&inputs_for(image, Some(GrayImage::new(3, 3)), None), &mut Outputs::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn missing_image_is_invalid_input() {
        let mut node = trainer();
        let mut inputs = Inputs::new("trainer");
        inputs.push(FRAME_NUMBER_PORT, Value::FrameNumber(0));
        let err = node.process(&inputs, &mut Outputs::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
