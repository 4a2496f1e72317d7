// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph assembly for the two kinds of run.
//!
//! Training: dealer -> reader -> image / depth / mask pyramids -> trainer ->
//! guarded model writer and flat-file persister. Detection: dealer and reader,
//! or a live sensor, -> image / depth pyramids -> tester (with every model
//! fanned into `models`) -> guarded detection writer.

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::config::{PyramidConfig, WiringConfig};
use crate::errors::PipelineError;
use crate::graph::{Graph, GraphBuilder, NodeId, RasterKind};
use crate::mmod::{MatchParams, TrainedModel, TrainingState};
use crate::nodes::dealer::OBSERVATION_PORT;
use crate::nodes::model_source::MODEL_PORT;
use crate::nodes::pyramid::INPUT_PORT;
use crate::nodes::reader::{DEPTH_PORT, FRAME_NUMBER_PORT, IMAGE_PORT, MASK_PORT};
use crate::nodes::tester::{DEBUG_IMAGE_PORT, DETECTIONS_PORT, MODELS_PORT};
use crate::nodes::trainer::{CORRESPONDENCES_PORT, FILTERS_PORT, OBJECTS_PORT};
use crate::nodes::{
    level_port, DetectionWriter, FlatFilePersister, FrameSource, Gate, GuardedSink, ModelSource,
    ModelWriter, ObservationDealer, ObservationReader, PyramidReducer, SensorSource, TesterNode,
    TrainerNode,
};
use crate::store::{ModelStore, ObservationStore};

/// A built graph plus the gates of its guarded writers.
pub struct Pipeline {
    pub graph: Graph,
    pub gates: Vec<Gate>,
}

impl Pipeline {
    pub fn set_writers_enabled(&self, enabled: bool) {
        for gate in &self.gates {
            gate.set_enabled(enabled);
        }
    }
}

/// A training pipeline and a handle on its trainer's template count.
pub struct TrainPipeline {
    pub pipeline: Pipeline,
    pub templates: Arc<AtomicUsize>,
}

/// Writers attached behind the trainer. Either may be absent.
pub struct TrainWriters {
    pub models: Option<(Arc<dyn ModelStore>, serde_json::Value)>,
    pub flat_files: Option<(PathBuf, PathBuf)>,
}

/// Where each raster enters the pyramids.
struct RasterSources<'a> {
    image: (NodeId, &'a str),
    depth: (NodeId, &'a str),
    mask: Option<(NodeId, &'a str)>,
}

/// Nodes whose `level_port(level)` output feeds the operator.
struct Levels {
    image: NodeId,
    depth: NodeId,
    mask: Option<NodeId>,
}

fn connect_as(
    g: &mut GraphBuilder,
    mandatory: bool,
    from: NodeId,
    output: &str,
    to: NodeId,
    input: &str,
) -> Result<(), PipelineError> {
    if mandatory {
        g.connect(from, output, to, input)
    } else {
        g.connect_optional(from, output, to, input)
    }
}

fn add_pyramids(
    g: &mut GraphBuilder,
    sources: RasterSources<'_>,
    pyramid: &PyramidConfig,
    wiring: WiringConfig,
) -> Result<Levels, PipelineError> {
    let image = g.add_node(
        "image_pyramid",
        PyramidReducer::new(RasterKind::Color, pyramid.n_levels)?,
    )?;
    g.connect(sources.image.0, sources.image.1, image, INPUT_PORT)?;

    let depth = g.add_node(
        "depth_pyramid",
        PyramidReducer::new(RasterKind::Depth, pyramid.n_levels)?,
    )?;
    connect_as(
        g,
        wiring.depth.is_mandatory(),
        sources.depth.0,
        sources.depth.1,
        depth,
        INPUT_PORT,
    )?;

    let mask = match sources.mask {
        Some((from, output)) => {
            let mask = g.add_node(
                "mask_pyramid",
                PyramidReducer::new(RasterKind::Mask, pyramid.n_levels)?,
            )?;
            connect_as(g, wiring.mask.is_mandatory(), from, output, mask, INPUT_PORT)?;
            Some(mask)
        }
        None => None,
    };

    Ok(Levels { image, depth, mask })
}

/// One object's training graph over `observation_ids`.
pub fn train_pipeline(
    store: Arc<dyn ObservationStore>,
    observation_ids: Vec<String>,
    state: TrainingState,
    pyramid: &PyramidConfig,
    wiring: WiringConfig,
    writers: TrainWriters,
) -> Result<TrainPipeline, PipelineError> {
    let mut g = GraphBuilder::new();
    let dealer = g.add_node("observation_dealer", ObservationDealer::new(observation_ids))?;
    let reader = g.add_node("observation_reader", ObservationReader::new(store))?;
    g.connect(dealer, OBSERVATION_PORT, reader, OBSERVATION_PORT)?;

    let levels = add_pyramids(
        &mut g,
        RasterSources {
            image: (reader, IMAGE_PORT),
            depth: (reader, DEPTH_PORT),
            mask: Some((reader, MASK_PORT)),
        },
        pyramid,
        wiring,
    )?;

    let object_id = state.object_id().to_string();
    let trainer_node = TrainerNode::new(state);
    let templates = trainer_node.template_counter();
    let trainer = g.add_node("trainer", trainer_node)?;
    let level = level_port(pyramid.level());
    g.connect(levels.image, &level, trainer, IMAGE_PORT)?;
    connect_as(
        &mut g,
        wiring.depth.is_mandatory(),
        levels.depth,
        &level,
        trainer,
        DEPTH_PORT,
    )?;
    if let Some(mask) = levels.mask {
        connect_as(&mut g, wiring.mask.is_mandatory(), mask, &level, trainer, MASK_PORT)?;
    }
    g.connect(reader, FRAME_NUMBER_PORT, trainer, FRAME_NUMBER_PORT)?;

    let mut gates = Vec::new();
    if let Some((store, parameters)) = writers.models {
        let (writer, gate) = GuardedSink::new(ModelWriter::new(store, object_id, parameters));
        let writer = g.add_node("model_writer", writer)?;
        g.connect_ports(
            trainer,
            writer,
            &[FILTERS_PORT, OBJECTS_PORT, CORRESPONDENCES_PORT],
        )?;
        gates.push(gate);
    }
    if let Some((filters_path, objects_path)) = writers.flat_files {
        let (persister, gate) =
            GuardedSink::new(FlatFilePersister::new(filters_path, objects_path));
        let persister = g.add_node("flat_file_persister", persister)?;
        g.connect_ports(trainer, persister, &[FILTERS_PORT, OBJECTS_PORT])?;
        gates.push(gate);
    }

    Ok(TrainPipeline {
        pipeline: Pipeline {
            graph: g.build()?,
            gates,
        },
        templates,
    })
}

/// Where detection frames come from.
pub enum FrameFeed {
    /// Replay stored observations; the run is bounded by their count.
    Store {
        store: Arc<dyn ObservationStore>,
        observation_ids: Vec<String>,
    },
    /// A live sensor; the run lasts until cancelled or the sensor runs dry.
    Live(Box<dyn FrameSource>),
}

/// Tester graph matching every model in `models` against each frame.
pub fn detect_pipeline(
    feed: FrameFeed,
    models: &[Arc<TrainedModel>],
    params: MatchParams,
    pyramid: &PyramidConfig,
    wiring: WiringConfig,
    writer: DetectionWriter,
) -> Result<Pipeline, PipelineError> {
    let mut g = GraphBuilder::new();
    let source = match feed {
        FrameFeed::Store {
            store,
            observation_ids,
        } => {
            let dealer =
                g.add_node("observation_dealer", ObservationDealer::new(observation_ids))?;
            let reader = g.add_node("observation_reader", ObservationReader::new(store))?;
            g.connect(dealer, OBSERVATION_PORT, reader, OBSERVATION_PORT)?;
            reader
        }
        FrameFeed::Live(sensor) => g.add_node("sensor_source", SensorSource::new(sensor))?,
    };

    let levels = add_pyramids(
        &mut g,
        RasterSources {
            image: (source, IMAGE_PORT),
            depth: (source, DEPTH_PORT),
            mask: None,
        },
        pyramid,
        wiring,
    )?;

    let tester = g.add_node("tester", TesterNode::new(params))?;
    let level = level_port(pyramid.level());
    g.connect(levels.image, &level, tester, IMAGE_PORT)?;
    connect_as(
        &mut g,
        wiring.depth.is_mandatory(),
        levels.depth,
        &level,
        tester,
        DEPTH_PORT,
    )?;
    g.connect(source, FRAME_NUMBER_PORT, tester, FRAME_NUMBER_PORT)?;
    for (index, model) in models.iter().enumerate() {
        let name = format!("model_{}_{}", index, model.object_id);
        let node = g.add_node(name, ModelSource::new(Arc::clone(model)))?;
        g.connect(node, MODEL_PORT, tester, MODELS_PORT)?;
    }

    let (writer, gate) = GuardedSink::new(writer);
    let writer = g.add_node("detection_writer", writer)?;
    g.connect_ports(tester, writer, &[DETECTIONS_PORT, DEBUG_IMAGE_PORT])?;
    g.connect(source, FRAME_NUMBER_PORT, writer, FRAME_NUMBER_PORT)?;

    Ok(Pipeline {
        graph: g.build()?,
        gates: vec![gate],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Channel;
    use crate::errors::ErrorKind;
    use crate::mmod::TrainParams;
    use crate::test_support::memory_store;

    fn pyramid(n_levels: usize) -> PyramidConfig {
        PyramidConfig {
            n_levels,
            level: None,
        }
    }

    #[tokio::test]
    async fn training_graph_runs_sources_before_writers() {
        let store = memory_store(&[("s1", "mug", 1)]).await;
        let models: Arc<dyn ModelStore> = store.clone();
        let train = train_pipeline(
            store,
            vec!["s1-0000".into()],
            TrainingState::new("mug", TrainParams::default()),
            &pyramid(2),
            WiringConfig::default(),
            TrainWriters {
                models: Some((models, serde_json::Value::Null)),
                flat_files: None,
            },
        )
        .unwrap();

        assert_eq!(
            train.pipeline.graph.execution_order(),
            vec![
                "observation_dealer",
                "observation_reader",
                "image_pyramid",
                "depth_pyramid",
                "mask_pyramid",
                "trainer",
                "model_writer",
            ]
        );
        assert_eq!(train.pipeline.gates.len(), 1);
        assert!(!train.pipeline.gates[0].is_enabled());
        train.pipeline.set_writers_enabled(true);
        assert!(train.pipeline.gates[0].is_enabled());
    }

    #[tokio::test]
    async fn detection_without_models_fails_to_build() {
        let store = memory_store(&[("s1", "mug", 1)]).await;
        let err = detect_pipeline(
            FrameFeed::Store {
                store,
                observation_ids: vec!["s1-0000".into()],
            },
            &[],
            MatchParams::default(),
            &pyramid(2),
            WiringConfig {
                depth: Channel::Optional,
                mask: Channel::Optional,
            },
            DetectionWriter::new(None, None),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn invalid_pyramid_depth_is_rejected_before_wiring() {
        let (_tx, sensor) = crate::nodes::ChannelSensor::channel(1);
        let err = detect_pipeline(
            FrameFeed::Live(Box::new(sensor)),
            &[Arc::new(TrainedModel::default())],
            MatchParams::default(),
            &pyramid(0),
            WiringConfig::default(),
            DetectionWriter::new(None, None),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
