// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

use crate::errors::PipelineError;

/// Failures reading from or writing to a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store answered, and the record does not exist.
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {}: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot decode raster {}: {source}", path.display())]
    Raster {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An attachment inside a model record could not be encoded or decoded.
    #[error("Attachment '{name}' is unusable: {message}")]
    Attachment { name: String, message: String },
}

impl StoreError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => PipelineError::NotFound(err.to_string()),
            StoreError::Document { .. } | StoreError::Raster { .. } | StoreError::Attachment { .. } => {
                PipelineError::invalid_input("store", err.to_string())
            }
            StoreError::Io { .. } => PipelineError::persistence("store", err),
        }
    }
}
