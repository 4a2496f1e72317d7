// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use super::features::{hue_bin, FEATURE_BINS};
use super::objects::{Detection, Rect};

/// Normalised hue histogram of the pixels a template was learned from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorFilter {
    pub histogram: [f32; FEATURE_BINS],
    /// Number of coloured pixels the histogram was built from.
    pub samples: u32,
}

impl ColorFilter {
    pub fn from_region(image: &RgbImage, region: Rect, mask: Option<&GrayImage>) -> Self {
        let mut counts = [0u32; FEATURE_BINS];
        let (w, h) = image.dimensions();
        let x_end = (region.x + region.width).min(w);
        let y_end = (region.y + region.height).min(h);
        for y in region.y..y_end {
            for x in region.x..x_end {
                if mask.is_some_and(|m| m.get_pixel(x, y)[0] == 0) {
                    continue;
                }
                let px = image.get_pixel(x, y);
                if let Some(bin) = hue_bin(px[0], px[1], px[2]) {
                    counts[bin] += 1;
                }
            }
        }
        let samples: u32 = counts.iter().sum();
        let mut histogram = [0.0; FEATURE_BINS];
        if samples > 0 {
            for (slot, count) in histogram.iter_mut().zip(counts) {
                *slot = count as f32 / samples as f32;
            }
        }
        Self { histogram, samples }
    }

    /// Histogram intersection in `[0, 1]`. An achromatic filter accepts
    /// anything; an achromatic region never matches a coloured filter.
    pub fn similarity(&self, other: &ColorFilter) -> f32 {
        if self.samples == 0 {
            return 1.0;
        }
        if other.samples == 0 {
            return 0.0;
        }
        self.histogram
            .iter()
            .zip(other.histogram.iter())
            .map(|(a, b)| a.min(*b))
            .sum()
    }
}

/// Colour filters keyed by template id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    filters: BTreeMap<u32, ColorFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, template_id: u32) -> Option<&ColorFilter> {
        self.filters.get(&template_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ColorFilter)> {
        self.filters.iter().map(|(id, f)| (*id, f))
    }

    pub fn insert(&mut self, template_id: u32, filter: ColorFilter) {
        self.filters.insert(template_id, filter);
    }

    pub fn learn(&mut self, template_id: u32, image: &RgbImage, region: Rect, mask: &GrayImage) {
        self.filters
            .insert(template_id, ColorFilter::from_region(image, region, Some(mask)));
    }

    /// Keep detections whose region agrees with their template's colour
    /// filter by at least `thresh`. Detections without a filter pass.
    pub fn filter_detections(
        &self,
        image: &RgbImage,
        detections: Vec<Detection>,
        thresh: f32,
    ) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|det| match self.filters.get(&det.template_id) {
                Some(filter) => {
                    let seen = ColorFilter::from_region(image, det.rect, None);
                    filter.similarity(&seen) >= thresh
                }
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb(color))
    }

    fn full() -> Rect {
        Rect { x: 0, y: 0, width: 8, height: 8 }
    }

    #[test]
    fn identical_colours_are_fully_similar() {
        let a = ColorFilter::from_region(&solid([200, 10, 10]), full(), None);
        let b = ColorFilter::from_region(&solid([200, 10, 10]), full(), None);
        assert_eq!(a.samples, 64);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn detections_of_the_wrong_colour_are_dropped() {
        let mut set = FilterSet::new();
        let mask = GrayImage::from_pixel(8, 8, image::Luma([255]));
        set.learn(3, &solid([200, 10, 10]), full(), &mask);

        let det = Detection {
            object_id: "mug".into(),
            template_id: 3,
            rect: full(),
            score: 1.0,
        };
        let kept = set.filter_detections(&solid([10, 10, 200]), vec![det.clone()], 0.91);
        assert!(kept.is_empty());
        let kept = set.filter_detections(&solid([200, 10, 10]), vec![det], 0.91);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn grey_templates_accept_any_region() {
        let grey = ColorFilter::from_region(&solid([90, 90, 90]), full(), None);
        let red = ColorFilter::from_region(&solid([200, 10, 10]), full(), None);
        assert_eq!(grey.similarity(&red), 1.0);
    }
}
