// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, Channel, DetectConfig, FlatFilePair, ModelsConfig,
    PyramidConfig, RunConfig, SensorConfig, SourceKind, StoreConfig, TrainConfig, TrainSelection,
    WiringConfig,
};
pub use validation::validate_run_config;
