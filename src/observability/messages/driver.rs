// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the batch driver: one graph per object or session.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Training for one object is starting.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use mmod_pipeline::observability::messages::driver::ObjectRunStarted;
///
/// let msg = ObjectRunStarted { object_id: "mug", observations: 42 };
/// tracing::info!("{}", msg);
/// ```
pub struct ObjectRunStarted<'a> {
    pub object_id: &'a str,
    pub observations: usize,
}

impl Display for ObjectRunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Training '{}' over {} observations",
            self.object_id, self.observations
        )
    }
}

impl StructuredLog for ObjectRunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            object_id = self.object_id,
            observations = self.observations,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "object_run",
            span_name = name,
            object_id = self.object_id,
            observations = self.observations,
        )
    }
}

/// The dealer for an object is empty. The run still flushes.
///
/// # Log Level
/// `warn!` - Degraded but continuing
pub struct NoObservations<'a> {
    pub object_id: &'a str,
}

impl Display for NoObservations<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "No observations for object '{}'", self.object_id)
    }
}

impl StructuredLog for NoObservations<'_> {
    fn log(&self) {
        tracing::warn!(object_id = self.object_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("no_observations", span_name = name, object_id = self.object_id)
    }
}

/// Training for one object completed and was flushed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ObjectRunFinished<'a> {
    pub object_id: &'a str,
    pub passes: usize,
    pub skipped: usize,
    pub templates: usize,
    pub duration: Duration,
}

impl Display for ObjectRunFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Finished '{}': {} passes ({} skipped), {} templates in {:?}",
            self.object_id, self.passes, self.skipped, self.templates, self.duration
        )
    }
}

impl StructuredLog for ObjectRunFinished<'_> {
    fn log(&self) {
        tracing::info!(
            object_id = self.object_id,
            passes = self.passes,
            skipped = self.skipped,
            templates = self.templates,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "object_run_finished",
            span_name = name,
            object_id = self.object_id,
        )
    }
}

/// Training for one object failed; the batch moves on.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ObjectRunFailed<'a> {
    pub object_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ObjectRunFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Training '{}' failed: {}", self.object_id, self.error)
    }
}

impl StructuredLog for ObjectRunFailed<'_> {
    fn log(&self) {
        tracing::error!(object_id = self.object_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "object_run_failed",
            span_name = name,
            object_id = self.object_id,
            error = %self.error,
        )
    }
}

/// A requested session id does not exist.
///
/// # Log Level
/// `warn!` - Degraded but continuing
pub struct SessionNotFound<'a> {
    pub session_id: &'a str,
}

impl Display for SessionNotFound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Session '{}' not found; skipping", self.session_id)
    }
}

impl StructuredLog for SessionNotFound<'_> {
    fn log(&self) {
        tracing::warn!(session_id = self.session_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("session_not_found", span_name = name, session_id = self.session_id)
    }
}

/// Trained models were loaded for detection.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ModelsLoaded<'a> {
    pub source: &'a str,
    pub models: usize,
    pub templates: usize,
}

impl Display for ModelsLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded {} models ({} templates) from {}",
            self.models, self.templates, self.source
        )
    }
}

impl StructuredLog for ModelsLoaded<'_> {
    fn log(&self) {
        tracing::info!(
            source = self.source,
            models = self.models,
            templates = self.templates,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("models_loaded", span_name = name, source = self.source)
    }
}

/// Every object of a batch has been attempted.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BatchCompleted {
    pub trained: usize,
    pub empty: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl Display for BatchCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Batch completed in {:?}: {} trained, {} without observations, {} failed",
            self.duration, self.trained, self.empty, self.failed
        )
    }
}

impl StructuredLog for BatchCompleted {
    fn log(&self) {
        tracing::info!(
            trained = self.trained,
            empty = self.empty,
            failed = self.failed,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("batch", span_name = name, failed = self.failed)
    }
}
