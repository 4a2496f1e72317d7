// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{Inputs, PortSpec};

/// A side-effecting writer. Sinks are only ever placed in a graph through
/// [`GuardedSink`](crate::nodes::GuardedSink), which decides when `write` runs.
#[async_trait]
pub trait Sink: Send {
    fn name(&self) -> &'static str;

    fn inputs(&self) -> Vec<PortSpec>;

    /// Commit the latest values seen on every input.
    async fn write(&mut self, inputs: &Inputs) -> Result<(), PipelineError>;
}
