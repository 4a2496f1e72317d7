// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Binary feature images: one byte per pixel with at most one bit set.
//!
//! Gradient features quantise the edge orientation (modulo 180°) into eight
//! bins; colour features quantise hue into eight bins. Pixels outside the
//! mask, with a weak gradient, or with too little chroma carry no feature.

use image::{GrayImage, RgbImage};

pub const FEATURE_BINS: usize = 8;

/// Squared Sobel magnitude below which a pixel carries no gradient feature.
pub const MIN_GRADIENT_MAGNITUDE_SQ: f32 = 40.0 * 40.0;

/// Chroma (max - min channel) below which a pixel carries no hue feature.
pub const MIN_CHROMA: u8 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    width: u32,
    height: u32,
    bits: Vec<u8>,
}

impl FeatureMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.bits[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, bits: u8) {
        self.bits[(y * self.width + x) as usize] = bits;
    }

    pub fn count_nonzero(&self) -> usize {
        self.bits.iter().filter(|&&b| b != 0).count()
    }

    /// OR every pixel with its neighbours within `radius`, so matching
    /// tolerates small misalignments.
    pub fn spread(&self, radius: u32) -> FeatureMap {
        let mut out = FeatureMap::new(self.width, self.height);
        let r = radius as i64;
        for y in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                let mut acc = 0u8;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let (sx, sy) = (x + dx, y + dy);
                        if sx >= 0 && sy >= 0 && sx < self.width as i64 && sy < self.height as i64 {
                            acc |= self.get(sx as u32, sy as u32);
                        }
                    }
                }
                out.set(x as u32, y as u32, acc);
            }
        }
        out
    }
}

#[inline]
fn masked_out(mask: Option<&GrayImage>, x: u32, y: u32) -> bool {
    mask.is_some_and(|m| m.get_pixel(x, y)[0] == 0)
}

/// Quantised gradient orientation on the luminance of `image`.
pub fn gradient_features(image: &RgbImage, mask: Option<&GrayImage>) -> FeatureMap {
    let gray = image::imageops::grayscale(image);
    let (w, h) = gray.dimensions();
    let mut map = FeatureMap::new(w, h);
    if w < 3 || h < 3 {
        return map;
    }

    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f32;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if masked_out(mask, x, y) {
                continue;
            }
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            if gx * gx + gy * gy < MIN_GRADIENT_MAGNITUDE_SQ {
                continue;
            }
            let mut angle = gy.atan2(gx);
            if angle < 0.0 {
                angle += std::f32::consts::PI;
            }
            let bin = ((angle / std::f32::consts::PI) * FEATURE_BINS as f32) as usize % FEATURE_BINS;
            map.set(x, y, 1 << bin);
        }
    }
    map
}

/// Hue bin of one pixel, or `None` when it is too grey to have a hue.
pub fn hue_bin(r: u8, g: u8, b: u8) -> Option<usize> {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    if chroma < MIN_CHROMA {
        return None;
    }
    let (rf, gf, bf, c) = (r as f32, g as f32, b as f32, chroma as f32);
    let hue = if max == r {
        ((gf - bf) / c).rem_euclid(6.0)
    } else if max == g {
        (bf - rf) / c + 2.0
    } else {
        (rf - gf) / c + 4.0
    };
    Some(((hue / 6.0) * FEATURE_BINS as f32) as usize % FEATURE_BINS)
}

/// Quantised hue per pixel.
pub fn hue_features(image: &RgbImage, mask: Option<&GrayImage>) -> FeatureMap {
    let (w, h) = image.dimensions();
    let mut map = FeatureMap::new(w, h);
    for (x, y, px) in image.enumerate_pixels() {
        if masked_out(mask, x, y) {
            continue;
        }
        if let Some(bin) = hue_bin(px[0], px[1], px[2]) {
            map.set(x, y, 1 << bin);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn vertical_edge(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| if x < w / 2 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) })
    }

    #[test]
    fn vertical_edge_yields_a_single_orientation() {
        let map = gradient_features(&vertical_edge(10, 10), None);
        let bins: std::collections::HashSet<u8> = (1..9)
            .map(|y| map.get(5, y))
            .chain((1..9).map(|y| map.get(4, y)))
            .filter(|&b| b != 0)
            .collect();
        assert_eq!(bins.len(), 1);
        assert_eq!(map.get(1, 5), 0, "flat region carries no feature");
    }

    #[test]
    fn mask_suppresses_features() {
        let mask = GrayImage::from_pixel(10, 10, Luma([0]));
        let map = gradient_features(&vertical_edge(10, 10), Some(&mask));
        assert_eq!(map.count_nonzero(), 0);
    }

    #[test]
    fn grey_pixels_have_no_hue() {
        assert_eq!(hue_bin(128, 128, 128), None);
        assert_eq!(hue_bin(255, 0, 0), Some(0));
        assert_ne!(hue_bin(0, 0, 255), hue_bin(0, 255, 0));
    }

    #[test]
    fn spread_ors_neighbours() {
        let mut map = FeatureMap::new(5, 5);
        map.set(2, 2, 0b100);
        let spread = map.spread(1);
        assert_eq!(spread.get(1, 1), 0b100);
        assert_eq!(spread.get(0, 0), 0);
    }
}
