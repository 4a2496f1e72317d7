// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::errors::PipelineError;
use crate::graph::{Graph, Inputs, Outputs, Value};
use crate::observability::messages::engine::{
    NodeWithheld, PassCompleted, PassSkipped, RunAborted, RunCancelled, RunCompleted, RunStarted,
};
use crate::observability::messages::StructuredLog;
use crate::traits::NodeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Pass count fixed up front by the graph's bounded sources.
    Bounded,
    /// Runs until cancelled or a source runs dry.
    Unbounded,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Bounded => f.write_str("bounded"),
            RunMode::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub mode: RunMode,
    /// Passes started, skipped ones included.
    pub passes: usize,
    pub completed: usize,
    /// Passes abandoned after a `NotFound`.
    pub skipped: usize,
    /// Nodes that committed something during the end-of-run flush.
    pub flushed: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

enum PassOutcome {
    Completed,
    Skipped,
    Exhausted,
}

/// Runs a [`Graph`] one pass at a time in its fixed topological order.
///
/// Within a pass each node sees only values produced earlier in the same
/// pass; nothing carries over between passes except the state nodes own.
pub struct Scheduler {
    graph: Graph,
}

impl Scheduler {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run exactly as many passes as the graph's bounded sources allow, then
    /// flush every node once. Consuming `self` makes a second flush of the
    /// same graph impossible. A fatal error aborts before the flush.
    pub async fn run_bounded(mut self) -> Result<RunReport, PipelineError> {
        let budget = self.graph.pass_budget().ok_or_else(|| {
            PipelineError::Configuration(
                "a bounded run needs a source that declares its pass count".to_string(),
            )
        })?;

        let started = RunStarted {
            mode: "bounded",
            node_count: self.graph.node_count(),
            planned_passes: Some(budget),
        };
        let span = started.span("scheduler");
        started.log();

        async move {
            let start = Instant::now();
            let mut report = RunReport {
                mode: RunMode::Bounded,
                passes: 0,
                completed: 0,
                skipped: 0,
                flushed: 0,
                cancelled: false,
                duration: Duration::ZERO,
            };

            for pass in 0..budget {
                match self.run_pass(pass).await? {
                    PassOutcome::Completed => report.completed += 1,
                    PassOutcome::Skipped => report.skipped += 1,
                    PassOutcome::Exhausted => break,
                }
                report.passes += 1;
            }

            report.flushed = self.flush(report.passes).await?;
            report.duration = start.elapsed();
            RunCompleted {
                mode: "bounded",
                passes: report.passes,
                skipped: report.skipped,
                duration: report.duration,
            }
            .log();
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Run passes until `token` is cancelled or a source reports exhaustion.
    /// The token is only checked between passes. Nothing is flushed.
    pub async fn run_until_cancelled(
        &mut self,
        token: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let started = RunStarted {
            mode: "unbounded",
            node_count: self.graph.node_count(),
            planned_passes: None,
        };
        let span = started.span("scheduler");
        started.log();

        async move {
            let start = Instant::now();
            let mut report = RunReport {
                mode: RunMode::Unbounded,
                passes: 0,
                completed: 0,
                skipped: 0,
                flushed: 0,
                cancelled: false,
                duration: Duration::ZERO,
            };

            while !token.is_cancelled() {
                match self.run_pass(report.passes).await? {
                    PassOutcome::Completed => report.completed += 1,
                    PassOutcome::Skipped => report.skipped += 1,
                    PassOutcome::Exhausted => break,
                }
                report.passes += 1;
            }

            report.cancelled = token.is_cancelled();
            report.duration = start.elapsed();
            if report.cancelled {
                RunCancelled {
                    passes: report.passes,
                }
                .log();
            }
            RunCompleted {
                mode: "unbounded",
                passes: report.passes,
                skipped: report.skipped,
                duration: report.duration,
            }
            .log();
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn run_pass(&mut self, pass: usize) -> Result<PassOutcome, PipelineError> {
        let start = Instant::now();
        let Graph {
            nodes,
            edges,
            order,
            incoming,
        } = &mut self.graph;

        let mut produced: Vec<Option<HashMap<String, Value>>> = vec![None; nodes.len()];

        for id in order.iter() {
            let index = id.index();
            let mut inputs = Inputs::new(nodes[index].name.clone());

            for &edge_index in &incoming[index] {
                let edge = &edges[edge_index];
                let value = produced[edge.from.index()]
                    .as_ref()
                    .and_then(|outputs| outputs.get(&edge.output));
                match value {
                    Some(value) => inputs.push(edge.input.clone(), value.clone()),
                    None if edge.mandatory => {
                        let error = PipelineError::invalid_input(
                            &nodes[index].name,
                            format!(
                                "mandatory input '{}' from '{}.{}' carried no value",
                                edge.input,
                                nodes[edge.from.index()].name,
                                edge.output
                            ),
                        );
                        RunAborted {
                            pass,
                            node: &nodes[index].name,
                            error: &error,
                        }
                        .log();
                        return Err(error);
                    }
                    None => {}
                }
            }

            let slot = &mut nodes[index];
            let withheld = slot
                .interface
                .inputs
                .iter()
                .find(|port| port.required && !inputs.contains(&port.name));
            if let Some(port) = withheld {
                NodeWithheld {
                    pass,
                    node: &slot.name,
                    port: &port.name,
                }
                .log();
                continue;
            }

            let mut outputs = Outputs::new();
            match slot.node.process(&inputs, &mut outputs).await {
                Ok(NodeStatus::Exhausted) => return Ok(PassOutcome::Exhausted),
                Ok(NodeStatus::Ready) => {}
                Err(error) if error.is_recoverable() => {
                    PassSkipped {
                        pass,
                        node: &slot.name,
                        error: &error,
                    }
                    .log();
                    return Ok(PassOutcome::Skipped);
                }
                Err(error) => {
                    RunAborted {
                        pass,
                        node: &slot.name,
                        error: &error,
                    }
                    .log();
                    return Err(error);
                }
            }

            let outputs = outputs.into_inner();
            for (port, value) in &outputs {
                let declared = slot.interface.find_output(port);
                if declared.map(|p| p.kind) != Some(value.kind()) {
                    let error = PipelineError::Configuration(format!(
                        "node '{}' produced {} on undeclared or mistyped output '{}'",
                        slot.name,
                        value.kind(),
                        port
                    ));
                    RunAborted {
                        pass,
                        node: &slot.name,
                        error: &error,
                    }
                    .log();
                    return Err(error);
                }
            }
            produced[index] = Some(outputs);
        }

        PassCompleted {
            pass,
            node_count: nodes.len(),
            duration: start.elapsed(),
        }
        .log();
        Ok(PassOutcome::Completed)
    }

    /// Call `finish` once on every node in execution order.
    async fn flush(&mut self, passes: usize) -> Result<usize, PipelineError> {
        let Graph { nodes, order, .. } = &mut self.graph;
        let mut flushed = 0;
        for id in order.iter() {
            let slot = &mut nodes[id.index()];
            match slot.node.finish().await {
                Ok(true) => flushed += 1,
                Ok(false) => {}
                Err(error) => {
                    RunAborted {
                        pass: passes,
                        node: &slot.name,
                        error: &error,
                    }
                    .log();
                    return Err(error);
                }
            }
        }
        Ok(flushed)
    }
}
