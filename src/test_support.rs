// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared fixtures for unit and integration tests.

use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::graph::DepthImage;
use crate::store::{CameraPose, MemoryStore, Observation, ObservationDocument, Session};

pub const SCENE_SIZE: u32 = 40;

/// Black canvas with a 16-pixel white square at (8, 8) and a mask that
/// covers the square plus a two-pixel margin.
pub fn square_scene() -> (RgbImage, GrayImage) {
    let image = RgbImage::from_fn(SCENE_SIZE, SCENE_SIZE, |x, y| {
        if (8..24).contains(&x) && (8..24).contains(&y) {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    let mask = GrayImage::from_fn(SCENE_SIZE, SCENE_SIZE, |x, y| {
        if (6..26).contains(&x) && (6..26).contains(&y) {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    (image, mask)
}

pub fn observation(
    id: &str,
    session_id: &str,
    object_id: &str,
    frame_number: i64,
    with_depth: bool,
    with_mask: bool,
) -> Observation {
    let (image, mask) = square_scene();
    Observation {
        document: ObservationDocument {
            id: id.to_string(),
            session_id: session_id.to_string(),
            object_id: object_id.to_string(),
            frame_number,
            camera: CameraPose::default(),
        },
        camera: Arc::new(CameraPose::default()),
        image: Arc::new(image),
        depth: with_depth
            .then(|| Arc::new(DepthImage::from_pixel(SCENE_SIZE, SCENE_SIZE, Luma([1200])))),
        mask: with_mask.then(|| Arc::new(mask)),
    }
}

/// A store holding one session per `(session, object, frames)` entry.
pub async fn memory_store(sessions: &[(&str, &str, usize)]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for (session_id, object_id, frames) in sessions {
        store
            .put_session(Session {
                id: session_id.to_string(),
                object_id: object_id.to_string(),
                description: String::new(),
            })
            .await;
        for frame in 0..*frames {
            let id = format!("{}-{:04}", session_id, frame);
            store
                .put_observation(observation(&id, session_id, object_id, frame as i64, true, true))
                .await;
        }
    }
    Arc::new(store)
}
