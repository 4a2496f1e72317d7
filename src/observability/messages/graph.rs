// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph wiring and validation.

use crate::errors::ValidationError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// An edge or node was refused by the graph builder.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use mmod_pipeline::errors::ValidationError;
/// use mmod_pipeline::observability::messages::graph::WiringRejected;
///
/// let error = ValidationError::SelfEdge { node: "trainer".into() };
/// let msg = WiringRejected { error: &error };
///
/// tracing::error!("{}", msg);
/// ```
pub struct WiringRejected<'a> {
    pub error: &'a ValidationError,
}

impl Display for WiringRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Graph wiring rejected: {}", self.error)
    }
}

impl StructuredLog for WiringRejected<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("wiring_rejected", span_name = name, error = %self.error)
    }
}

/// A graph passed validation and has an execution order.
///
/// # Log Level
/// `debug!` - Construction detail
pub struct GraphBuilt<'a> {
    pub node_count: usize,
    pub edge_count: usize,
    pub order: &'a [&'a str],
}

impl Display for GraphBuilt<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph built: {} nodes, {} edges, order [{}]",
            self.node_count,
            self.edge_count,
            self.order.join(", ")
        )
    }
}

impl StructuredLog for GraphBuilt<'_> {
    fn log(&self) {
        tracing::debug!(
            node_count = self.node_count,
            edge_count = self.edge_count,
            order = self.order.join(" -> "),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "graph_built",
            span_name = name,
            node_count = self.node_count,
            edge_count = self.edge_count,
        )
    }
}
