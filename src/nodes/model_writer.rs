// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::graph::{DataKind, Inputs, PortSpec};
use crate::mmod::{FilterSet, IdCorrespondences, ObjectSet, MODEL_TYPE};
use crate::observability::messages::operators::ModelRecordPersisted;
use crate::observability::messages::StructuredLog;
use crate::store::{ModelRecord, ModelStore, UpsertOutcome};
use crate::traits::Sink;

use super::trainer::{CORRESPONDENCES_PORT, FILTERS_PORT, OBJECTS_PORT};

/// Upserts one model record per object into a [`ModelStore`]. Failures are
/// reported as persistence failures and never retried.
pub struct ModelWriter {
    store: Arc<dyn ModelStore>,
    object_id: String,
    parameters: serde_json::Value,
}

impl ModelWriter {
    pub fn new(
        store: Arc<dyn ModelStore>,
        object_id: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            store,
            object_id: object_id.into(),
            parameters,
        }
    }
}

#[async_trait]
impl Sink for ModelWriter {
    fn name(&self) -> &'static str {
        "model_writer"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new(FILTERS_PORT, DataKind::Filters).optional(),
            PortSpec::new(OBJECTS_PORT, DataKind::Objects).optional(),
            PortSpec::new(CORRESPONDENCES_PORT, DataKind::Correspondences).optional(),
        ]
    }

    async fn write(&mut self, inputs: &Inputs) -> Result<(), PipelineError> {
        let filters: Arc<FilterSet> = inputs.get_as(FILTERS_PORT).unwrap_or_default();
        let objects: Arc<ObjectSet> = inputs.get_as(OBJECTS_PORT).unwrap_or_default();
        let correspondences: Arc<IdCorrespondences> =
            inputs.get_as(CORRESPONDENCES_PORT).unwrap_or_default();

        let record_id = ModelRecord::record_id(&self.object_id, MODEL_TYPE);
        let record = ModelRecord::encode(
            &self.object_id,
            MODEL_TYPE,
            self.parameters.clone(),
            &objects,
            &filters,
            &correspondences,
        )
        .map_err(|e| PipelineError::persistence(&record_id, e))?;

        let outcome = self
            .store
            .upsert_model(record)
            .await
            .map_err(|e| PipelineError::persistence(&record_id, e))?;

        ModelRecordPersisted {
            record_id: &record_id,
            object_id: &self.object_id,
            outcome: match outcome {
                UpsertOutcome::Created => "created",
                UpsertOutcome::Updated => "updated",
            },
            templates: objects.template_count(),
        }
        .log();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::store::{MemoryStore, StoreError};

    #[tokio::test]
    async fn empty_inputs_still_upsert_a_record() {
        let store = Arc::new(MemoryStore::new());
        let mut writer = ModelWriter::new(store.clone(), "mug", serde_json::json!({}));
        writer.write(&Inputs::new("writer")).await.unwrap();

        let record = store.model("mug-mmod").await.unwrap();
        assert_eq!(record.model_type, MODEL_TYPE);
        assert!(record.decode().unwrap().objects.is_empty());
    }

    struct Unwritable;

    #[async_trait]
    impl ModelStore for Unwritable {
        async fn upsert_model(&self, _record: ModelRecord) -> Result<UpsertOutcome, StoreError> {
            Err(StoreError::io(
                "/models",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }

        async fn models_for_object(
            &self,
            _object_id: &str,
            _model_type: &str,
        ) -> Result<Vec<ModelRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn store_failure_is_a_persistence_failure() {
        let mut writer = ModelWriter::new(Arc::new(Unwritable), "mug", serde_json::Value::Null);
        let err = writer.write(&Inputs::new("writer")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
