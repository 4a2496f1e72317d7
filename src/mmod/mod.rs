// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Multimodal template learning and matching.
//!
//! The operators are deliberately simple: templates are quantised gradient
//! orientations inside the object mask, matching is a strided sliding window
//! over a spread feature map, and each template carries a hue histogram used
//! to confirm candidate matches.

mod draw;
mod features;
mod filters;
mod objects;

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::consts::{
    DEFAULT_COLOR_FILTER_THRESH, DEFAULT_FRAC_OVERLAP, DEFAULT_SKIP_X, DEFAULT_SKIP_Y,
    DEFAULT_THRESH_LEARN, DEFAULT_THRESH_MATCH,
};
use crate::graph::DepthImage;

pub use draw::draw_detections;
pub use features::{gradient_features, hue_features, FeatureMap};
pub use filters::{ColorFilter, FilterSet};
pub use objects::{
    mask_bounds, suppress_overlaps, Detection, Feature, LearnOutcome, ObjectSet, Proposal, Rect,
    Template,
};

/// `model_type` of every record this crate writes and reads.
pub const MODEL_TYPE: &str = "MMOD";

/// Generated template id -> object id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdCorrespondences(BTreeMap<u32, String>);

impl IdCorrespondences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template_id: u32, object_id: impl Into<String>) {
        self.0.insert(template_id, object_id.into());
    }

    pub fn object_for(&self, template_id: u32) -> Option<&str> {
        self.0.get(&template_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub thresh_learn: f32,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            thresh_learn: DEFAULT_THRESH_LEARN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    pub thresh_match: f32,
    pub frac_overlap: f32,
    pub color_filter_thresh: f32,
    pub skip_x: u32,
    pub skip_y: u32,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            thresh_match: DEFAULT_THRESH_MATCH,
            frac_overlap: DEFAULT_FRAC_OVERLAP,
            color_filter_thresh: DEFAULT_COLOR_FILTER_THRESH,
            skip_x: DEFAULT_SKIP_X,
            skip_y: DEFAULT_SKIP_Y,
        }
    }
}

impl MatchParams {
    /// Spread radius that lets a stride-aligned window still catch a
    /// template sitting between two grid positions.
    pub fn spread_radius(&self) -> u32 {
        self.skip_x.max(self.skip_y) / 2
    }
}

/// Everything learned for one object, as handed to a tester.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub object_id: String,
    pub objects: ObjectSet,
    pub filters: FilterSet,
    pub correspondences: IdCorrespondences,
}

/// Accumulated learning state for one object. The driver creates one per
/// object and moves it into that object's trainer node, so nothing learned
/// for one object can reach another.
#[derive(Debug, Clone)]
pub struct TrainingState {
    object_id: String,
    params: TrainParams,
    objects: Arc<ObjectSet>,
    filters: Arc<FilterSet>,
    correspondences: Arc<IdCorrespondences>,
}

impl TrainingState {
    pub fn new(object_id: impl Into<String>, params: TrainParams) -> Self {
        Self {
            object_id: object_id.into(),
            params,
            objects: Arc::default(),
            filters: Arc::default(),
            correspondences: Arc::default(),
        }
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Offer one masked view. Snapshots already handed out are never
    /// mutated; a learned template produces fresh ones.
    /// The set is only copied when a template is actually learned.
    pub fn observe(&mut self, frame_number: i64, image: &RgbImage, mask: &GrayImage) -> LearnOutcome {
        let proposal = match self.objects.propose(
            &self.object_id,
            frame_number,
            image,
            mask,
            self.params.thresh_learn,
        ) {
            Ok(proposal) => proposal,
            Err(outcome) => return outcome,
        };
        let outcome = Arc::make_mut(&mut self.objects).commit(&self.object_id, proposal);
        if let Some(template_id) = outcome.template_id {
            if let Some(region) = mask_bounds(mask) {
                Arc::make_mut(&mut self.filters).learn(template_id, image, region, mask);
            }
            Arc::make_mut(&mut self.correspondences).insert(template_id, self.object_id.clone());
        }
        outcome
    }

    pub fn template_count(&self) -> usize {
        self.objects.template_count()
    }

    pub fn objects(&self) -> Arc<ObjectSet> {
        Arc::clone(&self.objects)
    }

    pub fn filters(&self) -> Arc<FilterSet> {
        Arc::clone(&self.filters)
    }

    pub fn correspondences(&self) -> Arc<IdCorrespondences> {
        Arc::clone(&self.correspondences)
    }
}

/// Raw candidate count alongside what survived suppression and filtering.
#[derive(Debug, Clone, Default)]
pub struct DetectionRun {
    pub raw: usize,
    pub detections: Vec<Detection>,
}

/// Match every model against one frame. Pixels with no depth reading, when
/// a depth map is given, contribute no features.
pub fn detect(
    models: &[Arc<TrainedModel>],
    image: &RgbImage,
    depth: Option<&DepthImage>,
    params: &MatchParams,
) -> DetectionRun {
    let valid = depth.map(|d| {
        GrayImage::from_fn(d.width(), d.height(), |x, y| {
            Luma([if d.get_pixel(x, y)[0] == 0 { 0 } else { 255 }])
        })
    });
    let scene = gradient_features(image, valid.as_ref()).spread(params.spread_radius());

    let mut raw = 0;
    let mut candidates = Vec::new();
    for model in models {
        let found = model.objects.match_all(&scene, params);
        raw += found.len();
        candidates.extend(
            model
                .filters
                .filter_detections(image, found, params.color_filter_thresh),
        );
    }
    DetectionRun {
        raw,
        detections: suppress_overlaps(candidates, params.frac_overlap),
    }
}
