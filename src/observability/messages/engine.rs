// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for scheduler lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Run start, completion, abort and cancellation
//! * Per-pass completion and recoverable skips
//! * Nodes withheld because an optional upstream produced nothing

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A scheduler run is starting.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use mmod_pipeline::observability::messages::engine::RunStarted;
///
/// let msg = RunStarted {
///     mode: "bounded",
///     node_count: 8,
///     planned_passes: Some(12),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunStarted<'a> {
    pub mode: &'a str,
    pub node_count: usize,
    pub planned_passes: Option<usize>,
}

impl Display for RunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.planned_passes {
            Some(passes) => write!(
                f,
                "Starting {} run: {} nodes, {} passes planned",
                self.mode, self.node_count, passes
            ),
            None => write!(
                f,
                "Starting {} run: {} nodes, running until cancelled",
                self.mode, self.node_count
            ),
        }
    }
}

impl StructuredLog for RunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            mode = self.mode,
            node_count = self.node_count,
            planned_passes = ?self.planned_passes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_run",
            span_name = name,
            mode = self.mode,
            node_count = self.node_count,
            planned_passes = ?self.planned_passes,
        )
    }
}

/// One pass ran every node.
///
/// # Log Level
/// `debug!` - Per-pass detail
pub struct PassCompleted {
    pub pass: usize,
    pub node_count: usize,
    pub duration: Duration,
}

impl Display for PassCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pass {} completed: {} nodes in {:?}",
            self.pass, self.node_count, self.duration
        )
    }
}

impl StructuredLog for PassCompleted {
    fn log(&self) {
        tracing::debug!(
            pass = self.pass,
            node_count = self.node_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "pass",
            span_name = name,
            pass = self.pass,
        )
    }
}

/// A pass was abandoned after a recoverable error (a record was not found).
///
/// # Log Level
/// `warn!` - Degraded but continuing
pub struct PassSkipped<'a> {
    pub pass: usize,
    pub node: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for PassSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Skipping pass {} at node '{}': {}",
            self.pass, self.node, self.error
        )
    }
}

impl StructuredLog for PassSkipped<'_> {
    fn log(&self) {
        tracing::warn!(
            pass = self.pass,
            node = self.node,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "pass_skipped",
            span_name = name,
            pass = self.pass,
            node = self.node,
        )
    }
}

/// A node did not run because a required input was withheld upstream.
///
/// # Log Level
/// `debug!` - Expected when optional channels are missing
pub struct NodeWithheld<'a> {
    pub pass: usize,
    pub node: &'a str,
    pub port: &'a str,
}

impl Display for NodeWithheld<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pass {}: node '{}' withheld, no value on '{}'",
            self.pass, self.node, self.port
        )
    }
}

impl StructuredLog for NodeWithheld<'_> {
    fn log(&self) {
        tracing::debug!(
            pass = self.pass,
            node = self.node,
            port = self.port,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "node_withheld",
            span_name = name,
            node = self.node,
            port = self.port,
        )
    }
}

/// A run finished without a fatal error.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunCompleted<'a> {
    pub mode: &'a str,
    pub passes: usize,
    pub skipped: usize,
    pub duration: Duration,
}

impl Display for RunCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} run completed: {} passes ({} skipped) in {:?}",
            self.mode, self.passes, self.skipped, self.duration
        )
    }
}

impl StructuredLog for RunCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            mode = self.mode,
            passes = self.passes,
            skipped = self.skipped,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run_completed",
            span_name = name,
            mode = self.mode,
            passes = self.passes,
        )
    }
}

/// A node raised a fatal error; no further passes run.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct RunAborted<'a> {
    pub pass: usize,
    pub node: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for RunAborted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Run aborted in pass {} at node '{}': {}",
            self.pass, self.node, self.error
        )
    }
}

impl StructuredLog for RunAborted<'_> {
    fn log(&self) {
        tracing::error!(
            pass = self.pass,
            node = self.node,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "run_aborted",
            span_name = name,
            pass = self.pass,
            node = self.node,
            error = %self.error,
        )
    }
}

/// An unbounded run observed its cancellation token between passes.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunCancelled {
    pub passes: usize,
}

impl Display for RunCancelled {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Run cancelled after {} passes", self.passes)
    }
}

impl StructuredLog for RunCancelled {
    fn log(&self) {
        tracing::info!(passes = self.passes, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("run_cancelled", span_name = name, passes = self.passes)
    }
}
