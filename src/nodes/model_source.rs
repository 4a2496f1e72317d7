// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{DataKind, Inputs, NodeInterface, Outputs, PortSpec};
use crate::mmod::TrainedModel;
use crate::traits::{Node, NodeStatus};

pub const MODEL_PORT: &str = "model";

/// Publishes one loaded model every pass, for fan-in into a tester.
pub struct ModelSource {
    model: Arc<TrainedModel>,
}

impl ModelSource {
    pub fn new(model: Arc<TrainedModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for ModelSource {
    fn name(&self) -> &'static str {
        "model_source"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new().output(PortSpec::new(MODEL_PORT, DataKind::Model))
    }

    async fn process(
        &mut self,
        _inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        outputs.set(MODEL_PORT, Arc::clone(&self.model));
        Ok(NodeStatus::Ready)
    }
}
