// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod node;
pub mod sink;

pub use node::{Node, NodeStatus};
pub use sink::Sink;
