// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{Inputs, NodeInterface, Outputs};

/// What a node reports back after processing one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Outputs (possibly none) were published; the pass continues.
    Ready,
    /// The node's source ran dry; the current pass is abandoned and the run ends.
    Exhausted,
}

/// A stage in the dataflow graph.
///
/// Nodes own their state exclusively; the scheduler hands each node a
/// `&mut self` once per pass, in dependency order, and never concurrently.
#[async_trait]
pub trait Node: Send {
    /// Operator type name, used in logs.
    fn name(&self) -> &'static str;

    /// The typed ports this node exposes. Called once when the node is added.
    fn interface(&self) -> NodeInterface;

    /// Number of passes this node can feed, if it is a bounded source.
    fn pass_budget(&self) -> Option<usize> {
        None
    }

    async fn process(
        &mut self,
        inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError>;

    /// Called once after a completed bounded run; `true` means something was committed.
    async fn finish(&mut self) -> Result<bool, PipelineError> {
        Ok(false)
    }
}
