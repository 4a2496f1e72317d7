// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;

use crate::errors::PipelineError;
use crate::graph::{DataKind, DepthImage, Inputs, NodeInterface, Outputs, PortSpec};
use crate::mmod::{detect, draw_detections, MatchParams, TrainedModel};
use crate::observability::messages::operators::DetectionsFound;
use crate::observability::messages::StructuredLog;
use crate::traits::{Node, NodeStatus};

use super::reader::{DEPTH_PORT, FRAME_NUMBER_PORT, IMAGE_PORT};

pub const MODELS_PORT: &str = "models";
pub const DETECTIONS_PORT: &str = "detections";
pub const DEBUG_IMAGE_PORT: &str = "debug_image";

/// Scores each frame against every model fanned into its `models` input.
pub struct TesterNode {
    params: MatchParams,
}

impl TesterNode {
    pub fn new(params: MatchParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Node for TesterNode {
    fn name(&self) -> &'static str {
        "tester"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new()
            .input(PortSpec::new(IMAGE_PORT, DataKind::Image))
            .input(PortSpec::new(DEPTH_PORT, DataKind::Depth).optional())
            .input(PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber).optional())
            .input(PortSpec::new(MODELS_PORT, DataKind::Model).aggregate())
            .output(PortSpec::new(DETECTIONS_PORT, DataKind::Detections))
            .output(PortSpec::new(DEBUG_IMAGE_PORT, DataKind::Image))
    }

    async fn process(
        &mut self,
        inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        let models: Vec<Arc<TrainedModel>> = inputs.all_as(MODELS_PORT);
        if models.is_empty() {
            return Err(PipelineError::Configuration(
                "the tester needs at least one trained model".to_string(),
            ));
        }
        let image: Arc<RgbImage> = inputs.require(IMAGE_PORT)?;
        let depth: Option<Arc<DepthImage>> = inputs.get_as(DEPTH_PORT);
        if let Some(d) = &depth {
            if d.dimensions() != image.dimensions() {
                return Err(PipelineError::invalid_input(
                    inputs.node(),
                    format!("depth is {:?} but image is {:?}", d.dimensions(), image.dimensions()),
                ));
            }
        }

        let run = detect(&models, &image, depth.as_deref(), &self.params);
        DetectionsFound {
            frame_number: inputs.get_as(FRAME_NUMBER_PORT),
            models: models.len(),
            raw: run.raw,
            kept: run.detections.len(),
        }
        .log();

        let debug = draw_detections(&image, &run.detections);
        outputs.set(DETECTIONS_PORT, Arc::new(run.detections));
        outputs.set(DEBUG_IMAGE_PORT, Arc::new(debug));
        Ok(NodeStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::graph::Value;
    use crate::mmod::{TrainParams, TrainingState};
    use crate::test_support::square_scene;

    fn trained_model(object_id: &str) -> Arc<TrainedModel> {
        let (image, mask) = square_scene();
        let mut state = TrainingState::new(object_id, TrainParams { thresh_learn: 0.0 });
        state.observe(0, &image, &mask);
        Arc::new(TrainedModel {
            object_id: object_id.to_string(),
            objects: (*state.objects()).clone(),
            filters: (*state.filters()).clone(),
            correspondences: (*state.correspondences()).clone(),
        })
    }

    #[tokio::test]
    async fn no_models_is_a_configuration_error() {
        let (image, _) = square_scene();
        let mut inputs = Inputs::new("tester");
        inputs.push(IMAGE_PORT, Value::from(Arc::new(image)));
        let err = TesterNode::new(MatchParams::default())
            .process(&inputs, &mut Outputs::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn detects_and_draws() {
        let (image, _) = square_scene();
        let mut inputs = Inputs::new("tester");
        inputs.push(IMAGE_PORT, Value::from(Arc::new(image)));
        inputs.push(MODELS_PORT, Value::Model(trained_model("mug")));
        let mut outputs = Outputs::new();
        TesterNode::new(MatchParams::default())
            .process(&inputs, &mut outputs)
            .await
            .unwrap();

        match outputs.get(DETECTIONS_PORT) {
            Some(Value::Detections(d)) => {
                assert_eq!(d.len(), 1);
                assert_eq!(d[0].object_id, "mug");
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert!(outputs.get(DEBUG_IMAGE_PORT).is_some());
    }
}
