// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // run config + validation
pub mod driver;        // per-object batches and detection runs
pub mod engine;        // pass scheduler
pub mod errors;        // error handling
pub mod graph;         // typed ports, values and the builder
pub mod mmod;          // template learning and matching
pub mod nodes;         // pipeline operators
pub mod observability;
pub mod store;         // observation and model documents
pub mod traits;        // node and sink abstractions

#[cfg(test)]
pub(crate) mod test_support;
