// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    ordered_ids, ModelRecord, ModelStore, Observation, ObservationDocument, ObservationStore,
    Session, StoreError, UpsertOutcome,
};
use crate::config::consts::{DEPTH_FILE, IMAGE_FILE, MASK_FILE, OBSERVATION_DOCUMENT};

/// Document store laid out as plain files under one root:
///
/// ```text
/// <root>/sessions/<session_id>.json
/// <root>/observations/<observation_id>/observation.json
///                                      image.png   (8-bit RGB)
///                                      depth.png   (16-bit grey, optional)
///                                      mask.png    (8-bit grey, optional)
/// <root>/models/<model_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn observations_dir(&self) -> PathBuf {
        self.root.join("observations")
    }

    fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub async fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.sessions_dir().join(format!("{}.json", session.id));
        write_json(&path, session).await
    }

    /// Store an observation document and its rasters.
    pub async fn put_observation(&self, observation: &Observation) -> Result<(), StoreError> {
        let dir = self.observations_dir().join(observation.id());
        write_json(&dir.join(OBSERVATION_DOCUMENT), &observation.document).await?;
        write_png(&dir.join(IMAGE_FILE), DynamicImage::ImageRgb8((*observation.image).clone())).await?;
        if let Some(depth) = &observation.depth {
            write_png(&dir.join(DEPTH_FILE), DynamicImage::ImageLuma16((**depth).clone())).await?;
        }
        if let Some(mask) = &observation.mask {
            write_png(&dir.join(MASK_FILE), DynamicImage::ImageLuma8((**mask).clone())).await?;
        }
        Ok(())
    }

    async fn observation_documents(&self) -> Result<Vec<ObservationDocument>, StoreError> {
        let mut docs = Vec::new();
        for dir in list_dir(&self.observations_dir()).await? {
            let path = dir.join(OBSERVATION_DOCUMENT);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                docs.push(read_json(&path).await?);
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl ObservationStore for FsDocumentStore {
    async fn session(&self, id: &str) -> Result<Session, StoreError> {
        let path = self.sessions_dir().join(format!("{}.json", id));
        match tokio::fs::read(&path).await {
            Ok(bytes) => parse_json(&path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found("session", id))
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();
        for path in list_dir(&self.sessions_dir()).await? {
            if path.extension().is_some_and(|ext| ext == "json") {
                sessions.push(read_json::<Session>(&path).await?);
            }
        }
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn observations_for_session(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        self.session(session_id).await?;
        let docs = self.observation_documents().await?;
        Ok(ordered_ids(
            docs.into_iter()
                .filter(|d| d.session_id == session_id)
                .map(|d| (d.frame_number, d.id))
                .collect(),
        ))
    }

    async fn observations_for_object(&self, object_id: &str) -> Result<Vec<String>, StoreError> {
        let docs = self.observation_documents().await?;
        Ok(ordered_ids(
            docs.into_iter()
                .filter(|d| d.object_id == object_id)
                .map(|d| (d.frame_number, d.id))
                .collect(),
        ))
    }

    async fn observation(&self, id: &str) -> Result<Observation, StoreError> {
        let dir = self.observations_dir().join(id);
        let doc_path = dir.join(OBSERVATION_DOCUMENT);
        let document: ObservationDocument = match tokio::fs::read(&doc_path).await {
            Ok(bytes) => parse_json(&doc_path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::not_found("observation", id))
            }
            Err(e) => return Err(StoreError::io(doc_path, e)),
        };

        let image = read_png(&dir.join(IMAGE_FILE))
            .await?
            .ok_or_else(|| StoreError::not_found("observation image", id))?
            .to_rgb8();
        let depth = read_png(&dir.join(DEPTH_FILE)).await?.map(|img| Arc::new(img.to_luma16()));
        let mask = read_png(&dir.join(MASK_FILE)).await?.map(|img| Arc::new(img.to_luma8()));

        Ok(Observation {
            camera: Arc::new(document.camera.clone()),
            document,
            image: Arc::new(image),
            depth,
            mask,
        })
    }
}

#[async_trait]
impl ModelStore for FsDocumentStore {
    async fn upsert_model(&self, record: ModelRecord) -> Result<UpsertOutcome, StoreError> {
        let path = self.models_dir().join(format!("{}.json", record.id));
        let existed = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        write_json(&path, &record).await?;
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    async fn models_for_object(
        &self,
        object_id: &str,
        model_type: &str,
    ) -> Result<Vec<ModelRecord>, StoreError> {
        let mut records = Vec::new();
        for path in list_dir(&self.models_dir()).await? {
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let record: ModelRecord = read_json(&path).await?;
            if record.object_id == object_id && record.model_type == model_type {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

/// Entries of a directory in name order; a missing directory is empty.
async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn parse_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Document {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    parse_json(path, &bytes)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Document {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes(path, &bytes).await
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Decode a PNG, `None` when the file does not exist.
pub(crate) async fn read_png(path: &Path) -> Result<Option<DynamicImage>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map(Some)
        .map_err(|source| StoreError::Raster {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) async fn write_png(path: &Path, image: DynamicImage) -> Result<(), StoreError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|source| StoreError::Raster {
            path: path.to_path_buf(),
            source,
        })?;
    write_bytes(path, buf.get_ref()).await
}
