// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Run-level error taxonomy.
//!
//! Every failure a node, the scheduler or the driver can raise is one of four
//! kinds. `NotFound` is the only recoverable kind inside a run: the scheduler
//! skips the rest of the pass that raised it. All other kinds abort the run.

use std::fmt;

use thiserror::Error;

use super::ValidationError;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Configuration,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::NotFound => "not found",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Persistence => "persistence failure",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or missing raster / observation field.
    #[error("Invalid input at '{node}': {message}")]
    InvalidInput { node: String, message: String },

    /// Unknown session, observation or model id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Required configuration is absent or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Graph wiring was rejected at construction time.
    #[error("Graph wiring rejected: {0}")]
    Wiring(#[from] ValidationError),

    /// A writer could not commit.
    #[error("Persistence failure for '{target}': {message}")]
    Persistence { target: String, message: String },
}

impl PipelineError {
    pub fn invalid_input(node: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn persistence(target: impl Into<String>, message: impl fmt::Display) -> Self {
        PipelineError::Persistence {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput { .. } => ErrorKind::InvalidInput,
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::Configuration(_) | PipelineError::Wiring(_) => ErrorKind::Configuration,
            PipelineError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Whether the scheduler may skip the current pass instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiring_errors_are_configuration_errors() {
        let err: PipelineError = ValidationError::SelfEdge {
            node: "trainer".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("trainer"));
    }

    #[test]
    fn only_not_found_is_recoverable() {
        assert!(PipelineError::NotFound("obs9".into()).is_recoverable());
        assert!(!PipelineError::invalid_input("pyr", "no raster").is_recoverable());
        assert!(!PipelineError::persistence("filters.txt", "disk full").is_recoverable());
    }
}
