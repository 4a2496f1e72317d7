// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Document-store access for observations, sessions and trained models.
//!
//! Two traits split reads of recorded data from writes of learned models so a
//! node only holds the capability it needs. [`FsDocumentStore`] and
//! [`MemoryStore`] implement both.

mod error;
mod fs;
mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::graph::DepthImage;
use crate::mmod::{FilterSet, IdCorrespondences, ObjectSet, TrainedModel};

pub use error::StoreError;
pub use fs::FsDocumentStore;
pub(crate) use fs::{read_png, write_png};
pub use memory::MemoryStore;

/// Camera intrinsics `k`, rotation `r` and translation `t` of one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub k: [[f64; 3]; 3],
    pub r: [[f64; 3]; 3],
    pub t: [f64; 3],
}

impl Default for CameraPose {
    fn default() -> Self {
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        Self {
            k: identity,
            r: identity,
            t: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub object_id: String,
    #[serde(default)]
    pub description: String,
}

/// The JSON part of an observation; rasters are stored next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationDocument {
    pub id: String,
    pub session_id: String,
    pub object_id: String,
    pub frame_number: i64,
    #[serde(default)]
    pub camera: CameraPose,
}

/// One recorded view with its rasters decoded.
#[derive(Debug, Clone)]
pub struct Observation {
    pub document: ObservationDocument,
    pub camera: Arc<CameraPose>,
    pub image: Arc<RgbImage>,
    pub depth: Option<Arc<DepthImage>>,
    pub mask: Option<Arc<GrayImage>>,
}

impl Observation {
    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn frame_number(&self) -> i64 {
        self.document.frame_number
    }
}

const OBJECTS_ATTACHMENT: &str = "objects";
const FILTERS_ATTACHMENT: &str = "filters";

/// Persisted form of a [`TrainedModel`]. The learned sets travel as base64
/// JSON attachments so the record itself stays a flat document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub object_id: String,
    pub model_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub id_correspondences: IdCorrespondences,
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
}

impl ModelRecord {
    /// Record id for an object's model; one record per object and type.
    pub fn record_id(object_id: &str, model_type: &str) -> String {
        format!("{}-{}", object_id, model_type.to_lowercase())
    }

    pub fn encode(
        object_id: &str,
        model_type: &str,
        parameters: serde_json::Value,
        objects: &ObjectSet,
        filters: &FilterSet,
        correspondences: &IdCorrespondences,
    ) -> Result<Self, StoreError> {
        let mut attachments = BTreeMap::new();
        attachments.insert(OBJECTS_ATTACHMENT.to_string(), encode_attachment(OBJECTS_ATTACHMENT, objects)?);
        attachments.insert(FILTERS_ATTACHMENT.to_string(), encode_attachment(FILTERS_ATTACHMENT, filters)?);
        Ok(Self {
            id: Self::record_id(object_id, model_type),
            object_id: object_id.to_string(),
            model_type: model_type.to_string(),
            parameters,
            id_correspondences: correspondences.clone(),
            attachments,
        })
    }

    /// Templates are checked here so a damaged record fails the load
    /// instead of a tester pass.
    pub fn decode(&self) -> Result<TrainedModel, StoreError> {
        let objects: ObjectSet = self.decode_attachment(OBJECTS_ATTACHMENT)?;
        objects.check().map_err(|message| StoreError::Attachment {
            name: OBJECTS_ATTACHMENT.to_string(),
            message,
        })?;
        Ok(TrainedModel {
            object_id: self.object_id.clone(),
            objects,
            filters: self.decode_attachment(FILTERS_ATTACHMENT)?,
            correspondences: self.id_correspondences.clone(),
        })
    }

    fn decode_attachment<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let corrupt = |message: String| StoreError::Attachment {
            name: name.to_string(),
            message,
        };
        let encoded = self
            .attachments
            .get(name)
            .ok_or_else(|| corrupt("missing".to_string()))?;
        let bytes = STANDARD.decode(encoded).map_err(|e| corrupt(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))
    }
}

fn encode_attachment<T: Serialize>(name: &str, value: &T) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Attachment {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(STANDARD.encode(bytes))
}

/// Whether an upsert created a record or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Read access to recorded sessions and observations.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn session(&self, id: &str) -> Result<Session, StoreError>;

    async fn sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Observation ids of a session, ordered by `(frame_number, id)`.
    async fn observations_for_session(&self, session_id: &str) -> Result<Vec<String>, StoreError>;

    /// Observation ids across every session of an object, same ordering.
    async fn observations_for_object(&self, object_id: &str) -> Result<Vec<String>, StoreError>;

    async fn observation(&self, id: &str) -> Result<Observation, StoreError>;
}

/// Read/write access to trained model records.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn upsert_model(&self, record: ModelRecord) -> Result<UpsertOutcome, StoreError>;

    async fn models_for_object(
        &self,
        object_id: &str,
        model_type: &str,
    ) -> Result<Vec<ModelRecord>, StoreError>;
}

/// Sort `(frame_number, id)` pairs and keep the ids.
pub(crate) fn ordered_ids(mut docs: Vec<(i64, String)>) -> Vec<String> {
    docs.sort();
    docs.into_iter().map(|(_, id)| id).collect()
}
