// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};

use crate::mmod::{Detection, FilterSet, IdCorrespondences, ObjectSet, TrainedModel};
use crate::store::CameraPose;

/// 16-bit depth map, zero meaning "no reading".
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// The kind of data an edge carries. Ports on both ends of an edge must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    ObservationId,
    Image,
    Depth,
    Mask,
    FrameNumber,
    Camera,
    Filters,
    Objects,
    Correspondences,
    Model,
    Detections,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataKind::ObservationId => "observation id",
            DataKind::Image => "colour image",
            DataKind::Depth => "depth map",
            DataKind::Mask => "mask",
            DataKind::FrameNumber => "frame number",
            DataKind::Camera => "camera pose",
            DataKind::Filters => "filter set",
            DataKind::Objects => "object templates",
            DataKind::Correspondences => "id correspondences",
            DataKind::Model => "trained model",
            DataKind::Detections => "detections",
        };
        f.write_str(label)
    }
}

/// The three raster kinds a pyramid reducer can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterKind {
    Color,
    Depth,
    Mask,
}

impl RasterKind {
    pub fn data_kind(self) -> DataKind {
        match self {
            RasterKind::Color => DataKind::Image,
            RasterKind::Depth => DataKind::Depth,
            RasterKind::Mask => DataKind::Mask,
        }
    }
}

/// A shared, immutable raster. Cloning only bumps a reference count.
#[derive(Debug, Clone)]
pub enum Raster {
    Color(Arc<RgbImage>),
    Depth(Arc<DepthImage>),
    Mask(Arc<GrayImage>),
}

impl Raster {
    pub fn kind(&self) -> RasterKind {
        match self {
            Raster::Color(_) => RasterKind::Color,
            Raster::Depth(_) => RasterKind::Depth,
            Raster::Mask(_) => RasterKind::Mask,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Raster::Color(img) => img.dimensions(),
            Raster::Depth(img) => img.dimensions(),
            Raster::Mask(img) => img.dimensions(),
        }
    }

    /// True when both rasters point at the same pixel buffer.
    pub fn shares_buffer(&self, other: &Raster) -> bool {
        match (self, other) {
            (Raster::Color(a), Raster::Color(b)) => Arc::ptr_eq(a, b),
            (Raster::Depth(a), Raster::Depth(b)) => Arc::ptr_eq(a, b),
            (Raster::Mask(a), Raster::Mask(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A value travelling along one edge during one pass.
#[derive(Debug, Clone)]
pub enum Value {
    ObservationId(String),
    Raster(Raster),
    FrameNumber(i64),
    Camera(Arc<CameraPose>),
    Filters(Arc<FilterSet>),
    Objects(Arc<ObjectSet>),
    Correspondences(Arc<IdCorrespondences>),
    Model(Arc<TrainedModel>),
    Detections(Arc<Vec<Detection>>),
}

impl Value {
    pub fn kind(&self) -> DataKind {
        match self {
            Value::ObservationId(_) => DataKind::ObservationId,
            Value::Raster(r) => r.kind().data_kind(),
            Value::FrameNumber(_) => DataKind::FrameNumber,
            Value::Camera(_) => DataKind::Camera,
            Value::Filters(_) => DataKind::Filters,
            Value::Objects(_) => DataKind::Objects,
            Value::Correspondences(_) => DataKind::Correspondences,
            Value::Model(_) => DataKind::Model,
            Value::Detections(_) => DataKind::Detections,
        }
    }
}

/// Typed extraction of a [`Value`]; returns `None` on a kind mismatch.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

value_conversions! {
    String => ObservationId,
    Raster => Raster,
    i64 => FrameNumber,
    Arc<CameraPose> => Camera,
    Arc<FilterSet> => Filters,
    Arc<ObjectSet> => Objects,
    Arc<IdCorrespondences> => Correspondences,
    Arc<TrainedModel> => Model,
    Arc<Vec<Detection>> => Detections,
}

impl From<Arc<RgbImage>> for Value {
    fn from(img: Arc<RgbImage>) -> Self {
        Value::Raster(Raster::Color(img))
    }
}

impl From<Arc<DepthImage>> for Value {
    fn from(img: Arc<DepthImage>) -> Self {
        Value::Raster(Raster::Depth(img))
    }
}

impl From<Arc<GrayImage>> for Value {
    fn from(img: Arc<GrayImage>) -> Self {
        Value::Raster(Raster::Mask(img))
    }
}

impl FromValue for Arc<RgbImage> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Raster(Raster::Color(img)) => Some(img.clone()),
            _ => None,
        }
    }
}

impl FromValue for Arc<DepthImage> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Raster(Raster::Depth(img)) => Some(img.clone()),
            _ => None,
        }
    }
}

impl FromValue for Arc<GrayImage> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Raster(Raster::Mask(img)) => Some(img.clone()),
            _ => None,
        }
    }
}
