// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{DataKind, Inputs, NodeInterface, Outputs, PortSpec};
use crate::store::ObservationStore;
use crate::traits::{Node, NodeStatus};

use super::dealer::OBSERVATION_PORT;

pub const IMAGE_PORT: &str = "image";
pub const DEPTH_PORT: &str = "depth";
pub const MASK_PORT: &str = "mask";
pub const CAMERA_PORT: &str = "camera";
pub const FRAME_NUMBER_PORT: &str = "frame_number";

/// Resolves an observation id to its rasters. Channels the record lacks are
/// simply not published, so downstream edges decide whether that is fatal.
pub struct ObservationReader {
    store: Arc<dyn ObservationStore>,
}

impl ObservationReader {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Node for ObservationReader {
    fn name(&self) -> &'static str {
        "observation_reader"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new()
            .input(PortSpec::new(OBSERVATION_PORT, DataKind::ObservationId))
            .output(PortSpec::new(IMAGE_PORT, DataKind::Image))
            .output(PortSpec::new(DEPTH_PORT, DataKind::Depth))
            .output(PortSpec::new(MASK_PORT, DataKind::Mask))
            .output(PortSpec::new(CAMERA_PORT, DataKind::Camera))
            .output(PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber))
    }

    async fn process(
        &mut self,
        inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        let id: String = inputs.require(OBSERVATION_PORT)?;
        let observation = self.store.observation(&id).await?;

        outputs.set(IMAGE_PORT, observation.image);
        if let Some(depth) = observation.depth {
            outputs.set(DEPTH_PORT, depth);
        }
        if let Some(mask) = observation.mask {
            outputs.set(MASK_PORT, mask);
        }
        outputs.set(CAMERA_PORT, observation.camera);
        outputs.set(FRAME_NUMBER_PORT, observation.document.frame_number);
        Ok(NodeStatus::Ready)
    }
}
