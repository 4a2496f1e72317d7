// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph nodes: sources, operators and guarded writers.

pub mod dealer;
pub mod debug_writer;
pub mod guarded;
pub mod model_source;
pub mod model_writer;
pub mod persister;
pub mod pyramid;
pub mod reader;
pub mod sensor;
pub mod tester;
pub mod trainer;

pub use dealer::ObservationDealer;
pub use debug_writer::DetectionWriter;
pub use guarded::{Gate, GuardedSink};
pub use model_source::ModelSource;
pub use model_writer::ModelWriter;
pub use persister::{read_flat_files, FlatFilePersister};
pub use pyramid::{build_pyramid, level_port, PyramidReducer};
pub use reader::ObservationReader;
pub use sensor::{ChannelSensor, DirectorySensor, Frame, FrameSource, SensorSource};
pub use tester::TesterNode;
pub use trainer::TrainerNode;
