// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{DataKind, Inputs, NodeInterface, Outputs, PortSpec};
use crate::traits::{Node, NodeStatus};

pub const OBSERVATION_PORT: &str = "observation";

/// Hands out one observation id per pass, in order, and sets the pass count
/// of a bounded run to the size of its collection.
#[derive(Debug, Clone)]
pub struct ObservationDealer {
    ids: Vec<String>,
    cursor: usize,
}

impl ObservationDealer {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.ids.len() - self.cursor
    }
}

#[async_trait]
impl Node for ObservationDealer {
    fn name(&self) -> &'static str {
        "observation_dealer"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new().output(PortSpec::new(OBSERVATION_PORT, DataKind::ObservationId))
    }

    fn pass_budget(&self) -> Option<usize> {
        Some(self.ids.len())
    }

    async fn process(
        &mut self,
        _inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        let Some(id) = self.ids.get(self.cursor) else {
            return Ok(NodeStatus::Exhausted);
        };
        outputs.set(OBSERVATION_PORT, id.clone());
        self.cursor += 1;
        Ok(NodeStatus::Ready)
    }
}
