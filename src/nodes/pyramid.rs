// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Multi-resolution reduction of one raster.
//!
//! Each level halves both linear dimensions of the previous one with a 2x2
//! area reduction. Odd dimensions round down: the trailing row or column is
//! dropped. Colour channels are averaged; depth averages only non-zero
//! readings (zero means "no reading"); masks keep a pixel when at least two of
//! its four sources are set.

use std::sync::Arc;

use async_trait::async_trait;
use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::errors::PipelineError;
use crate::graph::{DepthImage, Inputs, NodeInterface, Outputs, PortSpec, Raster, RasterKind};
use crate::traits::{Node, NodeStatus};

pub const INPUT_PORT: &str = "input";
pub const ORIGINAL_PORT: &str = "original";

/// Output port name of pyramid level `index`.
pub fn level_port(index: usize) -> String {
    format!("level_{}", index)
}

/// Reduce `raster` into `n_levels` levels; `level_0` shares the input buffer.
pub fn build_pyramid(raster: &Raster, n_levels: usize) -> Result<Vec<Raster>, PipelineError> {
    if n_levels == 0 {
        return Err(PipelineError::Configuration(
            "a pyramid needs at least one level".to_string(),
        ));
    }
    let (w, h) = raster.dimensions();
    let last = n_levels - 1;
    let halvings = u32::try_from(last).unwrap_or(u32::MAX);
    let smallest = |d: u32| d.checked_shr(halvings).unwrap_or(0);
    if smallest(w) == 0 || smallest(h) == 0 {
        return Err(PipelineError::invalid_input(
            "pyramid",
            format!("{}x{} raster cannot be halved {} times", w, h, last),
        ));
    }

    let mut levels = Vec::with_capacity(n_levels);
    levels.push(raster.clone());
    for _ in 1..n_levels {
        let next = match &levels[levels.len() - 1] {
            Raster::Color(img) => Raster::Color(Arc::new(halve_color(img))),
            Raster::Depth(img) => Raster::Depth(Arc::new(halve_depth(img))),
            Raster::Mask(img) => Raster::Mask(Arc::new(halve_mask(img))),
        };
        levels.push(next);
    }
    Ok(levels)
}

fn halve_color(src: &RgbImage) -> RgbImage {
    let (w, h) = (src.width() / 2, src.height() / 2);
    RgbImage::from_fn(w, h, |x, y| {
        let mut sum = [0u32; 3];
        for (sx, sy) in quad(x, y) {
            let px = src.get_pixel(sx, sy);
            for c in 0..3 {
                sum[c] += px[c] as u32;
            }
        }
        Rgb(sum.map(|s| ((s + 2) / 4) as u8))
    })
}

fn halve_depth(src: &DepthImage) -> DepthImage {
    let (w, h) = (src.width() / 2, src.height() / 2);
    DepthImage::from_fn(w, h, |x, y| {
        let (mut sum, mut n) = (0u32, 0u32);
        for (sx, sy) in quad(x, y) {
            let d = src.get_pixel(sx, sy)[0];
            if d != 0 {
                sum += d as u32;
                n += 1;
            }
        }
        Luma([if n == 0 { 0 } else { ((sum + n / 2) / n) as u16 }])
    })
}

fn halve_mask(src: &GrayImage) -> GrayImage {
    let (w, h) = (src.width() / 2, src.height() / 2);
    GrayImage::from_fn(w, h, |x, y| {
        let set = quad(x, y)
            .into_iter()
            .filter(|&(sx, sy)| src.get_pixel(sx, sy)[0] != 0)
            .count();
        Luma([if set >= 2 { 255 } else { 0 }])
    })
}

#[inline]
fn quad(x: u32, y: u32) -> [(u32, u32); 4] {
    let (sx, sy) = (x * 2, y * 2);
    [(sx, sy), (sx + 1, sy), (sx, sy + 1), (sx + 1, sy + 1)]
}

/// Graph node wrapping [`build_pyramid`] for one raster kind.
pub struct PyramidReducer {
    kind: RasterKind,
    n_levels: usize,
}

impl PyramidReducer {
    pub fn new(kind: RasterKind, n_levels: usize) -> Result<Self, PipelineError> {
        if n_levels == 0 {
            return Err(PipelineError::Configuration(
                "pyramid reducer needs n_levels >= 1".to_string(),
            ));
        }
        Ok(Self { kind, n_levels })
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }
}

#[async_trait]
impl Node for PyramidReducer {
    fn name(&self) -> &'static str {
        "pyramid_reducer"
    }

    fn interface(&self) -> NodeInterface {
        let kind = self.kind.data_kind();
        let mut interface = NodeInterface::new()
            .input(PortSpec::new(INPUT_PORT, kind))
            .output(PortSpec::new(ORIGINAL_PORT, kind));
        for i in 0..self.n_levels {
            interface = interface.output(PortSpec::new(level_port(i), kind));
        }
        interface
    }

    async fn process(
        &mut self,
        inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        let raster: Raster = inputs.require(INPUT_PORT)?;
        if raster.kind() != self.kind {
            return Err(PipelineError::invalid_input(
                inputs.node(),
                format!("expected a {:?} raster, got {:?}", self.kind, raster.kind()),
            ));
        }
        let levels = build_pyramid(&raster, self.n_levels).map_err(|e| match e {
            PipelineError::InvalidInput { message, .. } => {
                PipelineError::invalid_input(inputs.node(), message)
            }
            other => other,
        })?;
        outputs.set(ORIGINAL_PORT, raster);
        for (i, level) in levels.into_iter().enumerate() {
            outputs.set(level_port(i), level);
        }
        Ok(NodeStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::graph::Value;

    #[test]
    fn levels_halve_and_level_zero_is_the_input() {
        let img = Arc::new(RgbImage::from_pixel(640, 480, Rgb([10, 20, 30])));
        let raster = Raster::Color(img);
        let levels = build_pyramid(&raster, 3).unwrap();
        let dims: Vec<_> = levels.iter().map(Raster::dimensions).collect();
        assert_eq!(dims, vec![(640, 480), (320, 240), (160, 120)]);
        assert!(levels[0].shares_buffer(&raster));
    }

    #[test]
    fn odd_dimensions_round_down() {
        let raster = Raster::Mask(Arc::new(GrayImage::new(5, 3)));
        let levels = build_pyramid(&raster, 2).unwrap();
        assert_eq!(levels[1].dimensions(), (2, 1));
    }

    #[test]
    fn too_many_levels_is_invalid_input() {
        let raster = Raster::Color(Arc::new(RgbImage::new(4, 4)));
        assert!(build_pyramid(&raster, 3).is_ok());
        let err = build_pyramid(&raster, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            build_pyramid(&raster, 0).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn depth_ignores_missing_readings() {
        let mut depth = DepthImage::new(2, 2);
        depth.put_pixel(0, 0, Luma([1000]));
        depth.put_pixel(1, 1, Luma([2000]));
        let levels = build_pyramid(&Raster::Depth(Arc::new(depth)), 2).unwrap();
        match &levels[1] {
            Raster::Depth(d) => assert_eq!(d.get_pixel(0, 0)[0], 1500),
            other => panic!("unexpected raster {:?}", other.kind()),
        }
    }

    #[test]
    fn colour_is_area_averaged() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([100, 0, 0]));
        img.put_pixel(1, 1, Rgb([100, 0, 0]));
        let levels = build_pyramid(&Raster::Color(Arc::new(img)), 2).unwrap();
        match &levels[1] {
            Raster::Color(c) => assert_eq!(c.get_pixel(0, 0)[0], 50),
            other => panic!("unexpected raster {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn node_publishes_original_and_every_level() {
        let mut node = PyramidReducer::new(RasterKind::Mask, 2).unwrap();
        let mut inputs = Inputs::new("mask_pyramid");
        inputs.push(INPUT_PORT, Value::from(Arc::new(GrayImage::new(8, 6))));
        let mut outputs = Outputs::new();
        node.process(&inputs, &mut outputs).await.unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.get("level_1").is_some());
        assert!(PyramidReducer::new(RasterKind::Mask, 0).is_err());
    }
}
