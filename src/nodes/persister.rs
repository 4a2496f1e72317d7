// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Line-oriented flat files for learned state.
//!
//! The filter file holds one JSON object per colour filter and the object
//! index holds one JSON object per template, tagged with its object id.
//! Together they reconstruct a [`TrainedModel`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::graph::{DataKind, Inputs, PortSpec};
use crate::mmod::{ColorFilter, FilterSet, IdCorrespondences, ObjectSet, Template, TrainedModel};
use crate::observability::messages::operators::FlatFilesWritten;
use crate::observability::messages::StructuredLog;
use crate::traits::Sink;

use super::trainer::{FILTERS_PORT, OBJECTS_PORT};

#[derive(Debug, Serialize, Deserialize)]
struct FilterLine {
    template_id: u32,
    #[serde(flatten)]
    filter: ColorFilter,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectLine {
    object_id: String,
    template: Template,
}

pub struct FlatFilePersister {
    filters_path: PathBuf,
    objects_path: PathBuf,
}

impl FlatFilePersister {
    pub fn new(filters_path: impl Into<PathBuf>, objects_path: impl Into<PathBuf>) -> Self {
        Self {
            filters_path: filters_path.into(),
            objects_path: objects_path.into(),
        }
    }
}

fn to_lines<T: Serialize>(path: &Path, items: impl Iterator<Item = T>) -> Result<String, PipelineError> {
    let mut out = String::new();
    for item in items {
        let line = serde_json::to_string(&item)
            .map_err(|e| PipelineError::persistence(path.display().to_string(), e))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

async fn write_file(path: &Path, contents: String) -> Result<(), PipelineError> {
    let target = path.display().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::persistence(&target, e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| PipelineError::persistence(&target, e))
}

#[async_trait]
impl Sink for FlatFilePersister {
    fn name(&self) -> &'static str {
        "flat_file_persister"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new(FILTERS_PORT, DataKind::Filters).optional(),
            PortSpec::new(OBJECTS_PORT, DataKind::Objects).optional(),
        ]
    }

    /// Absent inputs are written as empty sets.
    async fn write(&mut self, inputs: &Inputs) -> Result<(), PipelineError> {
        let filters: Arc<FilterSet> = inputs.get_as(FILTERS_PORT).unwrap_or_default();
        let objects: Arc<ObjectSet> = inputs.get_as(OBJECTS_PORT).unwrap_or_default();

        let filter_lines = to_lines(
            &self.filters_path,
            filters.iter().map(|(template_id, filter)| FilterLine {
                template_id,
                filter: filter.clone(),
            }),
        )?;
        let object_lines = to_lines(
            &self.objects_path,
            objects.iter().map(|(object_id, template)| ObjectLine {
                object_id: object_id.to_string(),
                template: template.clone(),
            }),
        )?;

        write_file(&self.filters_path, filter_lines).await?;
        write_file(&self.objects_path, object_lines).await?;

        FlatFilesWritten {
            filters_path: &self.filters_path,
            objects_path: &self.objects_path,
            filters: filters.len(),
            templates: objects.template_count(),
        }
        .log();
        Ok(())
    }
}

/// Rebuild a model from a filter file and an object-index file.
pub async fn read_flat_files(
    filters_path: &Path,
    objects_path: &Path,
) -> Result<TrainedModel, PipelineError> {
    let read = |path: &Path| {
        let path = path.to_path_buf();
        async move {
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipelineError::NotFound(path.display().to_string())
                } else {
                    PipelineError::persistence(path.display().to_string(), e)
                }
            })
        }
    };
    let parse_error = |path: &Path, line: usize, e: serde_json::Error| {
        PipelineError::invalid_input(
            "flat_file_reader",
            format!("{}:{}: {}", path.display(), line + 1, e),
        )
    };

    let mut filters = FilterSet::new();
    for (n, line) in read(filters_path).await?.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: FilterLine =
            serde_json::from_str(line).map_err(|e| parse_error(filters_path, n, e))?;
        filters.insert(parsed.template_id, parsed.filter);
    }

    let mut objects = ObjectSet::new();
    let mut correspondences = IdCorrespondences::new();
    for (n, line) in read(objects_path).await?.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ObjectLine =
            serde_json::from_str(line).map_err(|e| parse_error(objects_path, n, e))?;
        parsed.template.check().map_err(|message| {
            PipelineError::invalid_input(
                "flat_file_reader",
                format!("{}:{}: {}", objects_path.display(), n + 1, message),
            )
        })?;
        correspondences.insert(parsed.template.id, parsed.object_id.clone());
        objects.insert(&parsed.object_id, parsed.template);
    }

    let object_id = objects.object_ids().next().unwrap_or_default().to_string();
    Ok(TrainedModel {
        object_id,
        objects,
        filters,
        correspondences,
    })
}
