// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::errors::PipelineError;
use crate::graph::{DataKind, Inputs, PortSpec};
use crate::mmod::Detection;
use crate::observability::messages::operators::DetectionReported;
use crate::observability::messages::StructuredLog;
use crate::store::write_png;
use crate::traits::Sink;

use super::reader::FRAME_NUMBER_PORT;
use super::tester::{DEBUG_IMAGE_PORT, DETECTIONS_PORT};

#[derive(Serialize)]
struct DetectionLogLine<'a> {
    frame_number: Option<i64>,
    detections: &'a [Detection],
}

/// Reports tester output: logs each detection and, when configured, saves
/// the debug image and appends a JSON line per frame. A frame already
/// written is not written again, so the end-of-run flush adds nothing new.
pub struct DetectionWriter {
    debug_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    last_frame: Option<Option<i64>>,
}

impl DetectionWriter {
    pub fn new(debug_dir: Option<PathBuf>, log_path: Option<PathBuf>) -> Self {
        Self {
            debug_dir,
            log_path,
            last_frame: None,
        }
    }

    async fn append_log(&self, line: &DetectionLogLine<'_>) -> Result<(), PipelineError> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        let target = path.display().to_string();
        let mut json =
            serde_json::to_string(line).map_err(|e| PipelineError::persistence(&target, e))?;
        json.push('\n');
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::persistence(&target, e))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| PipelineError::persistence(&target, e))?;
        // The line must be on disk before the write (or the flush) returns.
        let mut out = BufWriter::new(file);
        out.write_all(json.as_bytes())
            .await
            .map_err(|e| PipelineError::persistence(&target, e))?;
        out.flush()
            .await
            .map_err(|e| PipelineError::persistence(&target, e))
    }
}

#[async_trait]
impl Sink for DetectionWriter {
    fn name(&self) -> &'static str {
        "detection_writer"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new(DETECTIONS_PORT, DataKind::Detections).optional(),
            PortSpec::new(DEBUG_IMAGE_PORT, DataKind::Image).optional(),
            PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber).optional(),
        ]
    }

    async fn write(&mut self, inputs: &Inputs) -> Result<(), PipelineError> {
        let Some(detections) = inputs.get_as::<Arc<Vec<Detection>>>(DETECTIONS_PORT) else {
            return Ok(());
        };
        let frame_number: Option<i64> = inputs.get_as(FRAME_NUMBER_PORT);
        if self.last_frame == Some(frame_number) {
            return Ok(());
        }

        for det in detections.iter() {
            DetectionReported {
                object_id: &det.object_id,
                template_id: det.template_id,
                score: det.score,
                x: det.rect.x,
                y: det.rect.y,
            }
            .log();
        }

        if let (Some(dir), Some(image)) = (
            &self.debug_dir,
            inputs.get_as::<Arc<RgbImage>>(DEBUG_IMAGE_PORT),
        ) {
            let name = match frame_number {
                Some(n) => format!("detections_{:06}.png", n),
                None => "detections.png".to_string(),
            };
            let path = dir.join(name);
            write_png(&path, DynamicImage::ImageRgb8((*image).clone()))
                .await
                .map_err(|e| PipelineError::persistence(path.display().to_string(), e))?;
        }

        self.append_log(&DetectionLogLine {
            frame_number,
            detections: &detections,
        })
        .await?;
        self.last_frame = Some(frame_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Value;
    use crate::mmod::Rect;
    use tempfile::TempDir;

    fn frame_inputs(frame: i64) -> Inputs {
        let mut inputs = Inputs::new("detections");
        inputs.push(FRAME_NUMBER_PORT, Value::FrameNumber(frame));
        inputs.push(
            DETECTIONS_PORT,
            Value::Detections(Arc::new(vec![Detection {
                object_id: "mug".into(),
                template_id: 0,
                rect: Rect { x: 1, y: 2, width: 3, height: 4 },
                score: 0.97,
            }])),
        );
        inputs.push(DEBUG_IMAGE_PORT, Value::from(Arc::new(RgbImage::new(4, 4))));
        inputs
    }

    #[tokio::test]
    async fn each_frame_is_logged_once() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("detections.jsonl");
        let mut writer = DetectionWriter::new(Some(dir.path().join("debug")), Some(log_path.clone()));

        writer.write(&frame_inputs(0)).await.unwrap();
        writer.write(&frame_inputs(1)).await.unwrap();
        writer.write(&frame_inputs(1)).await.unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("\"object_id\":\"mug\""));
        assert!(dir.path().join("debug/detections_000001.png").exists());
    }

    #[tokio::test]
    async fn every_line_is_readable_as_soon_as_write_returns() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs/detections.jsonl");
        let mut writer = DetectionWriter::new(None, Some(log_path.clone()));

        for frame in 0..20 {
            writer.write(&frame_inputs(frame)).await.unwrap();
            let log = std::fs::read_to_string(&log_path).unwrap();
            assert_eq!(log.lines().count(), frame as usize + 1);
            let last: serde_json::Value = serde_json::from_str(log.lines().last().unwrap()).unwrap();
            assert_eq!(last["frame_number"], frame);
        }
    }

    #[tokio::test]
    async fn nothing_to_report_is_not_an_error() {
        let mut writer = DetectionWriter::new(None, None);
        writer.write(&Inputs::new("detections")).await.unwrap();
    }
}
