// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for operator nodes: trainer, tester, sensors and writers.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::Span;

/// The trainer added a template for a view.
///
/// # Log Level
/// `info!` - Learning progress
///
/// # Example
/// ```
/// use mmod_pipeline::observability::messages::operators::TemplateLearned;
///
/// let msg = TemplateLearned {
///     object_id: "mug",
///     frame_number: 14,
///     template_id: 3,
///     best_score: 0.82,
///     template_count: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct TemplateLearned<'a> {
    pub object_id: &'a str,
    pub frame_number: i64,
    pub template_id: u32,
    pub best_score: f32,
    pub template_count: usize,
}

impl Display for TemplateLearned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Learned template {} for '{}' from frame {} (best existing score {:.3}, {} templates)",
            self.template_id, self.object_id, self.frame_number, self.best_score, self.template_count
        )
    }
}

impl StructuredLog for TemplateLearned<'_> {
    fn log(&self) {
        tracing::info!(
            object_id = self.object_id,
            frame_number = self.frame_number,
            template_id = self.template_id,
            best_score = self.best_score,
            template_count = self.template_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "template_learned",
            span_name = name,
            object_id = self.object_id,
            frame_number = self.frame_number,
        )
    }
}

/// A view was already explained by an existing template.
///
/// # Log Level
/// `debug!` - Expected for most frames
pub struct ViewNotLearned<'a> {
    pub object_id: &'a str,
    pub frame_number: i64,
    pub best_score: f32,
}

impl Display for ViewNotLearned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Frame {} of '{}' already covered (score {:.3})",
            self.frame_number, self.object_id, self.best_score
        )
    }
}

impl StructuredLog for ViewNotLearned<'_> {
    fn log(&self) {
        tracing::debug!(
            object_id = self.object_id,
            frame_number = self.frame_number,
            best_score = self.best_score,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "view_not_learned",
            span_name = name,
            object_id = self.object_id,
            frame_number = self.frame_number,
        )
    }
}

/// The effective mask of a frame had no valid pixels.
///
/// # Log Level
/// `warn!` - Frame contributes nothing
pub struct EmptyMaskSkipped<'a> {
    pub object_id: &'a str,
    pub frame_number: i64,
}

impl Display for EmptyMaskSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Frame {} of '{}' has an empty mask; not learning from it",
            self.frame_number, self.object_id
        )
    }
}

impl StructuredLog for EmptyMaskSkipped<'_> {
    fn log(&self) {
        tracing::warn!(
            object_id = self.object_id,
            frame_number = self.frame_number,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "empty_mask",
            span_name = name,
            object_id = self.object_id,
            frame_number = self.frame_number,
        )
    }
}

/// The tester scored one frame.
///
/// # Log Level
/// `info!` when anything was kept, `debug!` otherwise
pub struct DetectionsFound {
    pub frame_number: Option<i64>,
    pub models: usize,
    pub raw: usize,
    pub kept: usize,
}

impl Display for DetectionsFound {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.frame_number {
            Some(frame) => write!(
                f,
                "Frame {}: {} detections kept of {} candidates across {} models",
                frame, self.kept, self.raw, self.models
            ),
            None => write!(
                f,
                "{} detections kept of {} candidates across {} models",
                self.kept, self.raw, self.models
            ),
        }
    }
}

impl StructuredLog for DetectionsFound {
    fn log(&self) {
        if self.kept > 0 {
            tracing::info!(
                frame_number = ?self.frame_number,
                models = self.models,
                raw = self.raw,
                kept = self.kept,
                "{}", self
            );
        } else {
            tracing::debug!(
                frame_number = ?self.frame_number,
                models = self.models,
                raw = self.raw,
                kept = 0,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "detections",
            span_name = name,
            frame_number = ?self.frame_number,
            kept = self.kept,
        )
    }
}

/// One confirmed detection.
///
/// # Log Level
/// `info!` - Result reporting
pub struct DetectionReported<'a> {
    pub object_id: &'a str,
    pub template_id: u32,
    pub score: f32,
    pub x: u32,
    pub y: u32,
}

impl Display for DetectionReported<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Detected '{}' at ({}, {}) with template {} score {:.3}",
            self.object_id, self.x, self.y, self.template_id, self.score
        )
    }
}

impl StructuredLog for DetectionReported<'_> {
    fn log(&self) {
        tracing::info!(
            object_id = self.object_id,
            template_id = self.template_id,
            score = self.score,
            x = self.x,
            y = self.y,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "detection",
            span_name = name,
            object_id = self.object_id,
            template_id = self.template_id,
        )
    }
}

/// The flat-file persister wrote its filter and object-index files.
///
/// # Log Level
/// `info!` - Commit point
pub struct FlatFilesWritten<'a> {
    pub filters_path: &'a Path,
    pub objects_path: &'a Path,
    pub filters: usize,
    pub templates: usize,
}

impl Display for FlatFilesWritten<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Wrote {} filters to {} and {} templates to {}",
            self.filters,
            self.filters_path.display(),
            self.templates,
            self.objects_path.display()
        )
    }
}

impl StructuredLog for FlatFilesWritten<'_> {
    fn log(&self) {
        tracing::info!(
            filters_path = %self.filters_path.display(),
            objects_path = %self.objects_path.display(),
            filters = self.filters,
            templates = self.templates,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flat_files_written",
            span_name = name,
            filters_path = %self.filters_path.display(),
        )
    }
}

/// A model record was upserted into the document store.
///
/// # Log Level
/// `info!` - Commit point
pub struct ModelRecordPersisted<'a> {
    pub record_id: &'a str,
    pub object_id: &'a str,
    /// "created" or "updated"
    pub outcome: &'a str,
    pub templates: usize,
}

impl Display for ModelRecordPersisted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Model record '{}' for '{}' {} ({} templates)",
            self.record_id, self.object_id, self.outcome, self.templates
        )
    }
}

impl StructuredLog for ModelRecordPersisted<'_> {
    fn log(&self) {
        tracing::info!(
            record_id = self.record_id,
            object_id = self.object_id,
            outcome = self.outcome,
            templates = self.templates,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "model_record_persisted",
            span_name = name,
            record_id = self.record_id,
        )
    }
}

/// A guarded sink performed its end-of-run flush.
///
/// # Log Level
/// `info!` - Commit point
pub struct SinkFlushed<'a> {
    pub sink: &'a str,
    pub gate_enabled: bool,
    /// Writes performed during the run while the gate was enabled.
    pub writes: usize,
}

impl Display for SinkFlushed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Sink '{}' flushed (gate {}, {} in-run writes)",
            self.sink,
            if self.gate_enabled { "enabled" } else { "disabled" },
            self.writes
        )
    }
}

impl StructuredLog for SinkFlushed<'_> {
    fn log(&self) {
        tracing::info!(
            sink = self.sink,
            gate_enabled = self.gate_enabled,
            writes = self.writes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("sink_flushed", span_name = name, sink = self.sink)
    }
}

/// A frame source ran dry.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SensorExhausted<'a> {
    pub sensor: &'a str,
    pub frames: u64,
}

impl Display for SensorExhausted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Sensor '{}' exhausted after {} frames",
            self.sensor, self.frames
        )
    }
}

impl StructuredLog for SensorExhausted<'_> {
    fn log(&self) {
        tracing::info!(sensor = self.sensor, frames = self.frames, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("sensor_exhausted", span_name = name, sensor = self.sensor)
    }
}
