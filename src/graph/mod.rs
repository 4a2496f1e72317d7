// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod builder;
mod ports;
mod value;

pub use builder::{Edge, Graph, GraphBuilder, NodeId};
pub(crate) use builder::NodeSlot;
pub use ports::{Inputs, NodeInterface, Outputs, PortSpec};
pub use value::{DataKind, DepthImage, FromValue, Raster, RasterKind, Value};
