// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Two-phase wrapper for side-effecting sinks.
//!
//! During a run the wrapper remembers the latest value seen on every input
//! and forwards a write only while its [`Gate`] is enabled. After a completed
//! bounded run the scheduler calls `finish` exactly once, which writes the
//! remembered values whatever the gate says, even when no pass ran.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{Inputs, NodeInterface, Outputs};
use crate::observability::messages::operators::SinkFlushed;
use crate::observability::messages::StructuredLog;
use crate::traits::{Node, NodeStatus, Sink};

/// Shared on/off switch of a [`GuardedSink`]. Disabled until set.
#[derive(Debug, Clone, Default)]
pub struct Gate(Arc<AtomicBool>);

impl Gate {
    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct GuardedSink<S: Sink> {
    sink: S,
    gate: Gate,
    latest: Inputs,
    writes: usize,
    flushed: bool,
}

impl<S: Sink> GuardedSink<S> {
    /// Wrap `sink`; the returned gate controls in-run writes.
    pub fn new(sink: S) -> (Self, Gate) {
        let gate = Gate::default();
        let latest = Inputs::new(sink.name());
        (
            Self {
                sink,
                gate: gate.clone(),
                latest,
                writes: 0,
                flushed: false,
            },
            gate,
        )
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of in-run writes performed while the gate was enabled.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[async_trait]
impl<S: Sink> Node for GuardedSink<S> {
    fn name(&self) -> &'static str {
        self.sink.name()
    }

    fn interface(&self) -> NodeInterface {
        self.sink
            .inputs()
            .into_iter()
            .fold(NodeInterface::new(), NodeInterface::input)
    }

    async fn process(
        &mut self,
        inputs: &Inputs,
        _outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        for (port, values) in inputs.ports() {
            self.latest.replace(port.clone(), values.clone());
        }
        if self.gate.is_enabled() {
            self.sink.write(&self.latest).await?;
            self.writes += 1;
        }
        Ok(NodeStatus::Ready)
    }

    async fn finish(&mut self) -> Result<bool, PipelineError> {
        if self.flushed {
            return Ok(false);
        }
        self.flushed = true;
        self.sink.write(&self.latest).await?;
        SinkFlushed {
            sink: self.sink.name(),
            gate_enabled: self.gate.is_enabled(),
            writes: self.writes,
        }
        .log();
        Ok(true)
    }
}
