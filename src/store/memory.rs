// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ordered_ids, ModelRecord, ModelStore, Observation, ObservationStore, Session, StoreError,
    UpsertOutcome,
};

/// In-process store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    observations: RwLock<HashMap<String, Observation>>,
    models: RwLock<HashMap<String, ModelRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_session(&self, session: Session) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn put_observation(&self, observation: Observation) {
        self.observations
            .write()
            .await
            .insert(observation.id().to_string(), observation);
    }

    pub async fn model(&self, id: &str) -> Option<ModelRecord> {
        self.models.read().await.get(id).cloned()
    }

    pub async fn model_count(&self) -> usize {
        self.models.read().await.len()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn session(&self, id: &str) -> Result<Session, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("session", id))
    }

    async fn sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn observations_for_session(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        self.session(session_id).await?;
        let observations = self.observations.read().await;
        Ok(ordered_ids(
            observations
                .values()
                .filter(|o| o.document.session_id == session_id)
                .map(|o| (o.frame_number(), o.id().to_string()))
                .collect(),
        ))
    }

    async fn observations_for_object(&self, object_id: &str) -> Result<Vec<String>, StoreError> {
        let observations = self.observations.read().await;
        Ok(ordered_ids(
            observations
                .values()
                .filter(|o| o.document.object_id == object_id)
                .map(|o| (o.frame_number(), o.id().to_string()))
                .collect(),
        ))
    }

    async fn observation(&self, id: &str) -> Result<Observation, StoreError> {
        self.observations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("observation", id))
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn upsert_model(&self, record: ModelRecord) -> Result<UpsertOutcome, StoreError> {
        let previous = self.models.write().await.insert(record.id.clone(), record);
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }

    async fn models_for_object(
        &self,
        object_id: &str,
        model_type: &str,
    ) -> Result<Vec<ModelRecord>, StoreError> {
        let mut records: Vec<ModelRecord> = self
            .models
            .read()
            .await
            .values()
            .filter(|r| r.object_id == object_id && r.model_type == model_type)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}
