// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use thiserror::Error;

use crate::graph::DataKind;

/// Errors that can occur while wiring or validating a dataflow graph
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A circular dependency was detected between nodes
    CyclicDependency {
        /// The cycle path showing the circular dependency
        cycle: Vec<String>,
    },
    /// An edge references a node that was never added
    UnknownNode {
        /// The node reference as the builder saw it
        node: String,
    },
    /// An edge references a port the node does not declare
    UnknownPort {
        node: String,
        port: String,
        /// "input" or "output"
        direction: &'static str,
    },
    /// Source output and destination input carry different data kinds
    IncompatibleKinds {
        from: String,
        from_kind: DataKind,
        to: String,
        to_kind: DataKind,
    },
    /// A second edge was wired into an input that is not an aggregate
    FanInNotAllowed { node: String, port: String },
    /// A node was connected to itself
    SelfEdge { node: String },
    /// Two nodes were added under the same instance name
    DuplicateNodeName { node: String },
    /// A required input has no incoming edge
    UnwiredInput { node: String, port: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnknownNode { node } => {
                write!(f, "Node '{}' is not part of this graph", node)
            }
            ValidationError::UnknownPort {
                node,
                port,
                direction,
            } => {
                write!(f, "Node '{}' declares no {} named '{}'", node, direction, port)
            }
            ValidationError::IncompatibleKinds {
                from,
                from_kind,
                to,
                to_kind,
            } => {
                write!(
                    f,
                    "Cannot connect '{}' ({}) to '{}' ({})",
                    from, from_kind, to, to_kind
                )
            }
            ValidationError::FanInNotAllowed { node, port } => {
                write!(
                    f,
                    "Input '{}.{}' already has a source and is not an aggregate input",
                    node, port
                )
            }
            ValidationError::SelfEdge { node } => {
                write!(f, "Node '{}' cannot consume its own output", node)
            }
            ValidationError::DuplicateNodeName { node } => {
                write!(f, "Duplicate node name: '{}'", node)
            }
            ValidationError::UnwiredInput { node, port } => {
                write!(f, "Required input '{}.{}' has no incoming edge", node, port)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A problem found while range-checking a run configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric setting is outside the range the pipeline accepts
    #[error("'{field}' must be within {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        range: &'static str,
    },
    /// A setting is present but unusable
    #[error("'{field}': {message}")]
    Invalid { field: &'static str, message: String },
    /// The mode being run has no section in the file
    #[error("the '{section}' section is required to {mode}")]
    MissingSection {
        section: &'static str,
        mode: &'static str,
    },
}
