// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use super::features::{gradient_features, FeatureMap};
use super::MatchParams;

/// Axis-aligned box in pixel coordinates of the level it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn intersection_area(&self, other: &Rect) -> u64 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        (x1 - x0) as u64 * (y1 - y0) as u64
    }

    /// Intersection over union, 0.0 for disjoint or empty boxes.
    pub fn overlap(&self, other: &Rect) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union == 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

/// Bounding box of all non-zero mask pixels.
pub fn mask_bounds(mask: &GrayImage) -> Option<Rect> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in mask.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| Rect {
        x: x0,
        y: y0,
        width: x1 - x0 + 1,
        height: y1 - y0 + 1,
    })
}

/// One feature pixel of a template, relative to the template origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub x: u32,
    pub y: u32,
    pub bits: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub frame_number: i64,
    pub features: Vec<Feature>,
}

impl Template {
    /// Extract the gradient features inside `mask`'s bounding box.
    pub fn extract(id: u32, frame_number: i64, image: &RgbImage, mask: &GrayImage) -> Option<Self> {
        let bounds = mask_bounds(mask)?;
        let map = gradient_features(image, Some(mask));
        let mut features = Vec::new();
        for y in bounds.y..bounds.y + bounds.height {
            for x in bounds.x..bounds.x + bounds.width {
                let bits = map.get(x, y);
                if bits != 0 {
                    features.push(Feature {
                        x: x - bounds.x,
                        y: y - bounds.y,
                        bits,
                    });
                }
            }
        }
        if features.is_empty() {
            return None;
        }
        Some(Self {
            id,
            width: bounds.width,
            height: bounds.height,
            frame_number,
            features,
        })
    }

    /// Reject a template that could not have been extracted: zero-sized,
    /// carrying the reserved id `u32::MAX`, or with a feature outside its
    /// own bounds.
    pub fn check(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "template {} is {}x{}",
                self.id, self.width, self.height
            ));
        }
        if self.id == u32::MAX {
            return Err(format!("template id {} is reserved", self.id));
        }
        if let Some(f) = self
            .features
            .iter()
            .find(|f| f.x >= self.width || f.y >= self.height)
        {
            return Err(format!(
                "template {} has a feature at ({}, {}) outside its {}x{} bounds",
                self.id, f.x, f.y, self.width, self.height
            ));
        }
        Ok(())
    }

    /// Fraction of this template's features present in `scene` at `(x, y)`.
    pub fn score_at(&self, scene: &FeatureMap, x: u32, y: u32) -> f32 {
        let fits = |origin: u32, size: u32, limit: u32| {
            origin.checked_add(size).is_some_and(|end| end <= limit)
        };
        if self.features.is_empty()
            || !fits(x, self.width, scene.width())
            || !fits(y, self.height, scene.height())
        {
            return 0.0;
        }
        let hits = self
            .features
            .iter()
            .filter(|f| scene.get(x + f.x, y + f.y) & f.bits != 0)
            .count();
        hits as f32 / self.features.len() as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub object_id: String,
    pub template_id: u32,
    pub rect: Rect,
    pub score: f32,
}

/// Result of offering one view to [`ObjectSet::learn`].
#[derive(Debug, Clone, PartialEq)]
pub struct LearnOutcome {
    /// Best similarity of the view to templates already held for the object.
    pub best_score: f32,
    pub template_id: Option<u32>,
}

impl LearnOutcome {
    pub fn learned(&self) -> bool {
        self.template_id.is_some()
    }
}

/// A view judged new enough to become a template.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub template: Template,
    pub best_score: f32,
}

/// Learned templates, grouped by object id. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSet {
    objects: BTreeMap<String, Vec<Template>>,
    next_template_id: u32,
}

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn templates(&self, object_id: &str) -> &[Template] {
        self.objects.get(object_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn template_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.template_count() == 0
    }

    /// Restore a previously learned template, e.g. from a flat file.
    pub fn insert(&mut self, object_id: &str, template: Template) {
        self.next_template_id = self.next_template_id.max(template.id.saturating_add(1));
        self.objects
            .entry(object_id.to_string())
            .or_default()
            .push(template);
    }

    /// [`Template::check`] over every template.
    pub fn check(&self) -> Result<(), String> {
        self.iter()
            .try_for_each(|(object_id, t)| t.check().map_err(|m| format!("{}: {}", object_id, m)))
    }

    /// Every template with the object it belongs to, in object order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Template)> {
        self.objects
            .iter()
            .flat_map(|(id, templates)| templates.iter().map(move |t| (id.as_str(), t)))
    }

    /// Learn a new template for `object_id` unless an existing one already
    /// explains this view with a similarity of at least `thresh_learn`.
    /// `thresh_learn <= 0` learns every view that has features.
    pub fn learn(
        &mut self,
        object_id: &str,
        frame_number: i64,
        image: &RgbImage,
        mask: &GrayImage,
        thresh_learn: f32,
    ) -> LearnOutcome {
        match self.propose(object_id, frame_number, image, mask, thresh_learn) {
            Ok(proposal) => self.commit(object_id, proposal),
            Err(outcome) => outcome,
        }
    }

    /// Decide on a view without touching the set. `Err` carries the
    /// outcome of a view that will not be learned.
    pub fn propose(
        &self,
        object_id: &str,
        frame_number: i64,
        image: &RgbImage,
        mask: &GrayImage,
        thresh_learn: f32,
    ) -> Result<Proposal, LearnOutcome> {
        let rejected = |best_score| LearnOutcome {
            best_score,
            template_id: None,
        };
        if self.next_template_id == u32::MAX {
            return Err(rejected(0.0));
        }
        let template = Template::extract(self.next_template_id, frame_number, image, mask)
            .ok_or_else(|| rejected(0.0))?;

        let best_score = self.best_existing_score(object_id, image, mask);
        if thresh_learn > 0.0 && best_score >= thresh_learn {
            return Err(rejected(best_score));
        }
        Ok(Proposal {
            template,
            best_score,
        })
    }

    /// Add a proposed template under the next free id.
    pub fn commit(&mut self, object_id: &str, proposal: Proposal) -> LearnOutcome {
        let Proposal {
            mut template,
            best_score,
        } = proposal;
        let Some(next_id) = self.next_template_id.checked_add(1) else {
            return LearnOutcome {
                best_score,
                template_id: None,
            };
        };
        template.id = self.next_template_id;
        self.next_template_id = next_id;
        let id = template.id;
        self.objects
            .entry(object_id.to_string())
            .or_default()
            .push(template);
        LearnOutcome {
            best_score,
            template_id: Some(id),
        }
    }

    fn best_existing_score(&self, object_id: &str, image: &RgbImage, mask: &GrayImage) -> f32 {
        let templates = self.templates(object_id);
        let Some(bounds) = mask_bounds(mask) else {
            return 0.0;
        };
        if templates.is_empty() {
            return 0.0;
        }
        let scene = gradient_features(image, Some(mask)).spread(1);
        templates
            .iter()
            .map(|t| t.score_at(&scene, bounds.x, bounds.y))
            .fold(0.0, f32::max)
    }

    /// Slide every template over `scene` on a `skip_x` x `skip_y` grid and
    /// keep positions scoring at least `thresh_match`. No suppression here.
    pub fn match_all(&self, scene: &FeatureMap, params: &MatchParams) -> Vec<Detection> {
        let step_x = params.skip_x.max(1);
        let step_y = params.skip_y.max(1);
        let mut detections = Vec::new();
        for (object_id, templates) in &self.objects {
            for template in templates {
                if template.width > scene.width() || template.height > scene.height() {
                    continue;
                }
                let mut y = 0;
                while y + template.height <= scene.height() {
                    let mut x = 0;
                    while x + template.width <= scene.width() {
                        let score = template.score_at(scene, x, y);
                        if score >= params.thresh_match {
                            detections.push(Detection {
                                object_id: object_id.clone(),
                                template_id: template.id,
                                rect: Rect {
                                    x,
                                    y,
                                    width: template.width,
                                    height: template.height,
                                },
                                score,
                            });
                        }
                        x += step_x;
                    }
                    y += step_y;
                }
            }
        }
        detections
    }
}

/// Greedy non-maximum suppression: highest score first, dropping any
/// detection overlapping a kept one by more than `frac_overlap`.
pub fn suppress_overlaps(mut detections: Vec<Detection>, frac_overlap: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if kept.iter().all(|k| k.rect.overlap(&det.rect) <= frac_overlap) {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::square_scene;

    #[test]
    fn mask_bounds_covers_nonzero_pixels() {
        let (_, mask) = square_scene();
        assert_eq!(
            mask_bounds(&mask),
            Some(Rect { x: 6, y: 6, width: 20, height: 20 })
        );
        assert_eq!(mask_bounds(&GrayImage::new(4, 4)), None);
    }

    fn template(id: u32, width: u32, height: u32, features: Vec<Feature>) -> Template {
        Template {
            id,
            width,
            height,
            frame_number: 0,
            features,
        }
    }

    #[test]
    fn check_rejects_templates_that_cannot_be_scored() {
        let inside = Feature { x: 1, y: 1, bits: 1 };
        assert!(template(0, 2, 2, vec![inside]).check().is_ok());
        assert!(template(0, 0, 2, vec![]).check().is_err());
        assert!(template(u32::MAX, 2, 2, vec![inside]).check().is_err());

        let outside = Feature { x: 500, y: 500, bits: 1 };
        let err = template(3, 2, 2, vec![outside]).check().unwrap_err();
        assert!(err.contains("(500, 500)"));

        let mut set = ObjectSet::new();
        set.insert("mug", template(3, 2, 2, vec![outside]));
        assert!(set.check().unwrap_err().starts_with("mug: "));
    }

    #[test]
    fn oversized_template_scores_zero_instead_of_overflowing() {
        let scene = FeatureMap::new(8, 8);
        let huge = template(0, u32::MAX, 1, vec![Feature { x: 0, y: 0, bits: 1 }]);
        assert_eq!(huge.score_at(&scene, 4, 0), 0.0);
    }

    #[test]
    fn highest_template_id_stops_learning_without_overflow() {
        let (image, mask) = square_scene();
        let mut set = ObjectSet::new();
        set.insert("mug", template(u32::MAX, 2, 2, vec![]));
        let outcome = set.learn("mug", 0, &image, &mask, 0.0);
        assert!(!outcome.learned());
        assert_eq!(set.template_count(), 1);
    }

    #[test]
    fn repeated_view_is_not_learned_twice() {
        let (image, mask) = square_scene();
        let mut set = ObjectSet::new();
        let first = set.learn("mug", 0, &image, &mask, 0.9);
        assert!(first.learned());
        let second = set.learn("mug", 1, &image, &mask, 0.9);
        assert!(!second.learned());
        assert!(second.best_score >= 0.9);
        assert_eq!(set.template_count(), 1);
    }

    #[test]
    fn non_positive_threshold_learns_every_view() {
        let (image, mask) = square_scene();
        let mut set = ObjectSet::new();
        set.learn("mug", 0, &image, &mask, 0.0);
        set.learn("mug", 1, &image, &mask, -1.0);
        assert_eq!(set.templates("mug").len(), 2);
        assert_eq!(set.templates("mug")[1].id, 1);
    }

    #[test]
    fn learned_template_is_found_in_its_own_scene() {
        let (image, mask) = square_scene();
        let mut set = ObjectSet::new();
        set.learn("mug", 0, &image, &mask, 0.0);
        let scene = gradient_features(&image, None).spread(4);
        let params = MatchParams::default();
        let found = suppress_overlaps(set.match_all(&scene, &params), params.frac_overlap);
        assert!(!found.is_empty());
        assert_eq!(found[0].object_id, "mug");
        assert!(found[0].score >= params.thresh_match);
    }

    #[test]
    fn suppression_keeps_the_strongest_of_overlapping_boxes() {
        let det = |x, score| Detection {
            object_id: "a".into(),
            template_id: 0,
            rect: Rect { x, y: 0, width: 10, height: 10 },
            score,
        };
        let kept = suppress_overlaps(vec![det(0, 0.96), det(1, 0.99), det(30, 0.95)], 0.6);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].rect.x, 1);
        assert_eq!(kept[1].rect.x, 30);
    }
}
