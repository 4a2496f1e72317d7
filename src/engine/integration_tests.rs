// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scheduler runs over real nodes: dealer, reader, pyramids, trainer and
//! guarded writers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbImage;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::engine::{RunMode, Scheduler};
use crate::errors::{ErrorKind, PipelineError};
use crate::graph::{
    DataKind, Graph, GraphBuilder, Inputs, NodeId, NodeInterface, Outputs, PortSpec, Raster,
    RasterKind,
};
use crate::mmod::{ObjectSet, TrainParams, TrainingState};
use crate::nodes::dealer::OBSERVATION_PORT;
use crate::nodes::pyramid::INPUT_PORT;
use crate::nodes::reader::{DEPTH_PORT, FRAME_NUMBER_PORT, IMAGE_PORT, MASK_PORT};
use crate::nodes::trainer::{FILTERS_PORT, OBJECTS_PORT};
use crate::nodes::{
    level_port, read_flat_files, ChannelSensor, FlatFilePersister, Frame, Gate, GuardedSink,
    ObservationDealer, ObservationReader, PyramidReducer, SensorSource, TrainerNode,
};
use crate::store::{MemoryStore, Session};
use crate::test_support::{memory_store, observation, SCENE_SIZE};
use crate::traits::{Node, NodeStatus, Sink};

/// Counts writes and remembers how many templates the last write saw.
#[derive(Clone, Default)]
struct Tally {
    writes: Arc<AtomicUsize>,
    templates: Arc<AtomicUsize>,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl Sink for Tally {
    fn name(&self) -> &'static str {
        "tally"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new(OBJECTS_PORT, DataKind::Objects).optional(),
            PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber).optional(),
        ]
    }

    async fn write(&mut self, inputs: &Inputs) -> Result<(), PipelineError> {
        let writes = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(objects) = inputs.get_as::<Arc<ObjectSet>>(OBJECTS_PORT) {
            self.templates
                .store(objects.template_count(), Ordering::SeqCst);
        }
        if let Some((limit, token)) = &self.cancel_after {
            if writes >= *limit {
                token.cancel();
            }
        }
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Sink for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new(OBJECTS_PORT, DataKind::Objects).optional()]
    }

    async fn write(&mut self, _inputs: &Inputs) -> Result<(), PipelineError> {
        Err(PipelineError::persistence("models", "disk full"))
    }
}

struct TrainGraph {
    builder: GraphBuilder,
    trainer: NodeId,
}

/// dealer -> reader -> {image, depth, mask} pyramids -> trainer at level 1.
fn train_graph(store: Arc<MemoryStore>, ids: &[&str], depth_mandatory: bool) -> TrainGraph {
    let mut g = GraphBuilder::new();
    let dealer = g
        .add_node(
            "dealer",
            ObservationDealer::new(ids.iter().map(|s| s.to_string()).collect()),
        )
        .unwrap();
    let reader = g.add_node("reader", ObservationReader::new(store)).unwrap();
    let image = g
        .add_node("image_pyramid", PyramidReducer::new(RasterKind::Color, 2).unwrap())
        .unwrap();
    let depth = g
        .add_node("depth_pyramid", PyramidReducer::new(RasterKind::Depth, 2).unwrap())
        .unwrap();
    let mask = g
        .add_node("mask_pyramid", PyramidReducer::new(RasterKind::Mask, 2).unwrap())
        .unwrap();
    let trainer = g
        .add_node(
            "trainer",
            TrainerNode::new(TrainingState::new("mug", TrainParams { thresh_learn: 0.0 })),
        )
        .unwrap();

    let level = level_port(1);
    g.connect(dealer, OBSERVATION_PORT, reader, OBSERVATION_PORT)
        .unwrap();
    g.connect(reader, IMAGE_PORT, image, INPUT_PORT).unwrap();
    g.connect_optional(reader, MASK_PORT, mask, INPUT_PORT)
        .unwrap();
    g.connect(image, &level, trainer, IMAGE_PORT).unwrap();
    g.connect_optional(mask, &level, trainer, MASK_PORT).unwrap();
    g.connect(reader, FRAME_NUMBER_PORT, trainer, FRAME_NUMBER_PORT)
        .unwrap();
    if depth_mandatory {
        g.connect(reader, DEPTH_PORT, depth, INPUT_PORT).unwrap();
        g.connect(depth, &level, trainer, DEPTH_PORT).unwrap();
    } else {
        g.connect_optional(reader, DEPTH_PORT, depth, INPUT_PORT)
            .unwrap();
        g.connect_optional(depth, &level, trainer, DEPTH_PORT)
            .unwrap();
    }

    TrainGraph { builder: g, trainer }
}

fn with_tally(mut tg: TrainGraph, tally: Tally) -> (Graph, Gate) {
    let (sink, gate) = GuardedSink::new(tally);
    let sink = tg.builder.add_node("tally", sink).unwrap();
    tg.builder
        .connect(tg.trainer, OBJECTS_PORT, sink, OBJECTS_PORT)
        .unwrap();
    (tg.builder.build().unwrap(), gate)
}

#[tokio::test]
async fn two_observations_run_two_passes_and_flush_once() {
    let dir = TempDir::new().unwrap();
    let filters_path = dir.path().join("filters.jsonl");
    let objects_path = dir.path().join("objects.jsonl");
    let store = memory_store(&[("s1", "mug", 2)]).await;

    let mut tg = train_graph(store, &["s1-0000", "s1-0001"], true);
    let (persister, _gate) = GuardedSink::new(FlatFilePersister::new(&filters_path, &objects_path));
    let persister = tg.builder.add_node("persister", persister).unwrap();
    tg.builder
        .connect_ports(tg.trainer, persister, &[FILTERS_PORT, OBJECTS_PORT])
        .unwrap();

    let report = Scheduler::new(tg.builder.build().unwrap())
        .run_bounded()
        .await
        .unwrap();
    assert_eq!(report.mode, RunMode::Bounded);
    assert_eq!(report.passes, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(report.flushed, 1);

    let model = read_flat_files(&filters_path, &objects_path).await.unwrap();
    assert_eq!(model.object_id, "mug");
    assert_eq!(model.objects.template_count(), 2);
    assert_eq!(model.filters.len(), 2);
}

#[tokio::test]
async fn disabled_gate_writes_only_at_the_flush() {
    let store = memory_store(&[("s1", "mug", 3)]).await;
    let tally = Tally::default();
    let (graph, gate) = with_tally(
        train_graph(store, &["s1-0000", "s1-0001", "s1-0002"], true),
        tally.clone(),
    );
    assert!(!gate.is_enabled());

    let report = Scheduler::new(graph).run_bounded().await.unwrap();
    assert_eq!(report.passes, 3);
    assert_eq!(tally.writes.load(Ordering::SeqCst), 1);
    assert_eq!(tally.templates.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn enabled_gate_writes_every_pass_plus_the_flush() {
    let store = memory_store(&[("s1", "mug", 2)]).await;
    let tally = Tally::default();
    let (graph, gate) = with_tally(train_graph(store, &["s1-0000", "s1-0001"], true), tally.clone());
    gate.set_enabled(true);

    Scheduler::new(graph).run_bounded().await.unwrap();
    assert_eq!(tally.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn empty_dealer_runs_no_pass_but_still_flushes() {
    let dir = TempDir::new().unwrap();
    let filters_path = dir.path().join("filters.jsonl");
    let objects_path = dir.path().join("objects.jsonl");
    let store = memory_store(&[]).await;

    let mut tg = train_graph(store, &[], true);
    let (persister, _gate) = GuardedSink::new(FlatFilePersister::new(&filters_path, &objects_path));
    let persister = tg.builder.add_node("persister", persister).unwrap();
    tg.builder
        .connect_ports(tg.trainer, persister, &[FILTERS_PORT, OBJECTS_PORT])
        .unwrap();

    let report = Scheduler::new(tg.builder.build().unwrap())
        .run_bounded()
        .await
        .unwrap();
    assert_eq!(report.passes, 0);
    assert_eq!(report.flushed, 1);
    assert_eq!(std::fs::read_to_string(&filters_path).unwrap(), "");
    assert_eq!(std::fs::read_to_string(&objects_path).unwrap(), "");
}

async fn store_without_depth() -> Arc<MemoryStore> {
    let store = memory_store(&[]).await;
    store
        .put_session(Session {
            id: "s1".into(),
            object_id: "mug".into(),
            description: String::new(),
        })
        .await;
    store
        .put_observation(observation("s1-0000", "s1", "mug", 0, false, true))
        .await;
    store
}

#[tokio::test]
async fn missing_depth_on_a_mandatory_edge_aborts_without_flush() {
    let tally = Tally::default();
    let (graph, _gate) = with_tally(
        train_graph(store_without_depth().await, &["s1-0000"], true),
        tally.clone(),
    );

    let err = Scheduler::new(graph).run_bounded().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.to_string().contains("depth"));
    assert_eq!(tally.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_depth_on_an_optional_edge_still_trains() {
    let tally = Tally::default();
    let (graph, _gate) = with_tally(
        train_graph(store_without_depth().await, &["s1-0000"], false),
        tally.clone(),
    );

    let report = Scheduler::new(graph).run_bounded().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(tally.writes.load(Ordering::SeqCst), 1);
    assert_eq!(tally.templates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_observation_skips_only_its_pass() {
    let store = memory_store(&[("s1", "mug", 2)]).await;
    let tally = Tally::default();
    let (graph, _gate) = with_tally(
        train_graph(store, &["s1-0000", "ghost", "s1-0001"], true),
        tally.clone(),
    );

    let report = Scheduler::new(graph).run_bounded().await.unwrap();
    assert_eq!(report.passes, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.completed, 2);
    assert_eq!(tally.templates.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fatal_sink_error_aborts_before_any_flush() {
    let store = memory_store(&[("s1", "mug", 2)]).await;
    let tally = Tally::default();
    let mut tg = train_graph(store, &["s1-0000", "s1-0001"], true);
    let (failing, failing_gate) = GuardedSink::new(Failing);
    failing_gate.set_enabled(true);
    let failing = tg.builder.add_node("failing", failing).unwrap();
    tg.builder
        .connect(tg.trainer, OBJECTS_PORT, failing, OBJECTS_PORT)
        .unwrap();
    let (graph, _gate) = with_tally(tg, tally.clone());

    let err = Scheduler::new(graph).run_bounded().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(tally.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bounded_run_without_a_dealer_is_a_configuration_error() {
    let (_tx, sensor) = ChannelSensor::channel(1);
    let mut g = GraphBuilder::new();
    g.add_node("sensor", SensorSource::new(Box::new(sensor)))
        .unwrap();

    let err = Scheduler::new(g.build().unwrap())
        .run_bounded()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

fn frame(n: i64) -> Frame {
    Frame {
        frame_number: n,
        image: Arc::new(RgbImage::new(8, 8)),
        depth: None,
    }
}

fn sensor_graph(sensor: ChannelSensor, tally: Tally) -> Graph {
    let mut g = GraphBuilder::new();
    let source = g
        .add_node("sensor", SensorSource::new(Box::new(sensor)))
        .unwrap();
    let (sink, gate) = GuardedSink::new(tally);
    gate.set_enabled(true);
    let sink = g.add_node("tally", sink).unwrap();
    g.connect(source, FRAME_NUMBER_PORT, sink, FRAME_NUMBER_PORT)
        .unwrap();
    g.build().unwrap()
}

#[tokio::test]
async fn unbounded_run_stops_between_passes_once_cancelled() {
    let (tx, sensor) = ChannelSensor::channel(8);
    for n in 0..5 {
        tx.send(frame(n)).await.unwrap();
    }
    let token = CancellationToken::new();
    let tally = Tally {
        cancel_after: Some((2, token.clone())),
        ..Tally::default()
    };

    let mut scheduler = Scheduler::new(sensor_graph(sensor, tally.clone()));
    let report = scheduler.run_until_cancelled(&token).await.unwrap();
    assert_eq!(report.mode, RunMode::Unbounded);
    assert!(report.cancelled);
    assert_eq!(report.passes, 2);
    assert_eq!(report.flushed, 0);
    assert_eq!(tally.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unbounded_run_ends_when_the_sensor_runs_dry() {
    let (tx, sensor) = ChannelSensor::channel(8);
    for n in 0..3 {
        tx.send(frame(n)).await.unwrap();
    }
    drop(tx);
    let tally = Tally::default();

    let mut scheduler = Scheduler::new(sensor_graph(sensor, tally.clone()));
    let report = scheduler
        .run_until_cancelled(&CancellationToken::new())
        .await
        .unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.passes, 3);
    assert_eq!(tally.writes.load(Ordering::SeqCst), 3);
}

/// Declares an image output but publishes a frame number on it.
struct Mislabelled;

#[async_trait]
impl Node for Mislabelled {
    fn name(&self) -> &'static str {
        "mislabelled"
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface::new().output(PortSpec::new(IMAGE_PORT, DataKind::Image))
    }

    fn pass_budget(&self) -> Option<usize> {
        Some(1)
    }

    async fn process(
        &mut self,
        _inputs: &Inputs,
        outputs: &mut Outputs,
    ) -> Result<NodeStatus, PipelineError> {
        outputs.set(IMAGE_PORT, 7i64);
        Ok(NodeStatus::Ready)
    }
}

#[tokio::test]
async fn mistyped_output_is_a_configuration_error() {
    let mut g = GraphBuilder::new();
    g.add_node("mislabelled", Mislabelled).unwrap();
    let err = Scheduler::new(g.build().unwrap())
        .run_bounded()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

/// What one write of [`PassRecorder`] saw.
#[derive(Debug, Clone, PartialEq)]
struct SeenPass {
    observation: Option<String>,
    frame_number: Option<i64>,
    /// `(port, dimensions)` for every pyramid level present.
    levels: Vec<(String, (u32, u32))>,
}

const PYRAMIDS: [(&str, RasterKind); 3] = [
    ("image", RasterKind::Color),
    ("depth", RasterKind::Depth),
    ("mask", RasterKind::Mask),
];

fn level_input(pyramid: &str, level: usize) -> String {
    format!("{}_{}", pyramid, level_port(level))
}

/// Records the dealt id, the frame number and each pyramid level per write.
#[derive(Clone, Default)]
struct PassRecorder {
    seen: Arc<Mutex<Vec<SeenPass>>>,
}

#[async_trait]
impl Sink for PassRecorder {
    fn name(&self) -> &'static str {
        "pass_recorder"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        let mut ports = vec![
            PortSpec::new(OBSERVATION_PORT, DataKind::ObservationId).optional(),
            PortSpec::new(FRAME_NUMBER_PORT, DataKind::FrameNumber).optional(),
        ];
        for (pyramid, kind) in PYRAMIDS {
            for level in 0..2 {
                ports.push(PortSpec::new(level_input(pyramid, level), kind.data_kind()).optional());
            }
        }
        ports
    }

    async fn write(&mut self, inputs: &Inputs) -> Result<(), PipelineError> {
        let mut levels = Vec::new();
        for (pyramid, _) in PYRAMIDS {
            for level in 0..2 {
                let port = level_input(pyramid, level);
                if let Some(raster) = inputs.get_as::<Raster>(&port) {
                    levels.push((port, raster.dimensions()));
                }
            }
        }
        self.seen.lock().unwrap().push(SeenPass {
            observation: inputs.get_as(OBSERVATION_PORT),
            frame_number: inputs.get_as(FRAME_NUMBER_PORT),
            levels,
        });
        Ok(())
    }
}

async fn run_recorded(deal: &[&str]) -> Vec<SeenPass> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_session(Session {
            id: "s1".into(),
            object_id: "mug".into(),
            description: String::new(),
        })
        .await;
    store.put_observation(observation("obs1", "s1", "mug", 1, true, true)).await;
    store.put_observation(observation("obs2", "s1", "mug", 2, true, true)).await;

    let mut g = GraphBuilder::new();
    let dealer = g
        .add_node(
            "dealer",
            ObservationDealer::new(deal.iter().map(|s| s.to_string()).collect()),
        )
        .unwrap();
    let reader = g.add_node("reader", ObservationReader::new(store)).unwrap();
    g.connect(dealer, OBSERVATION_PORT, reader, OBSERVATION_PORT)
        .unwrap();

    let recorder = PassRecorder::default();
    let (sink, gate) = GuardedSink::new(recorder.clone());
    gate.set_enabled(true);
    let sink = g.add_node("recorder", sink).unwrap();
    g.connect(dealer, OBSERVATION_PORT, sink, OBSERVATION_PORT)
        .unwrap();
    g.connect(reader, FRAME_NUMBER_PORT, sink, FRAME_NUMBER_PORT)
        .unwrap();

    for ((pyramid, kind), source) in PYRAMIDS.into_iter().zip([IMAGE_PORT, DEPTH_PORT, MASK_PORT]) {
        let node = g
            .add_node(
                format!("{}_pyramid", pyramid),
                PyramidReducer::new(kind, 2).unwrap(),
            )
            .unwrap();
        g.connect(reader, source, node, INPUT_PORT).unwrap();
        for level in 0..2 {
            g.connect(node, &level_port(level), sink, &level_input(pyramid, level))
                .unwrap();
        }
    }

    let report = Scheduler::new(g.build().unwrap())
        .run_bounded()
        .await
        .unwrap();
    assert_eq!(report.passes, deal.len());
    assert_eq!(report.completed, deal.len());

    let seen = recorder.seen.lock().unwrap().clone();
    // One write per pass plus the flush.
    assert_eq!(seen.len(), deal.len() + 1);
    seen
}

#[tokio::test]
async fn every_pass_sees_its_dealt_id_and_both_levels_of_each_pyramid() {
    let seen = run_recorded(&["obs1", "obs2"]).await;

    let order: Vec<_> = seen[..2]
        .iter()
        .map(|p| (p.observation.clone(), p.frame_number))
        .collect();
    assert_eq!(
        order,
        vec![(Some("obs1".to_string()), Some(1)), (Some("obs2".to_string()), Some(2))]
    );

    let full = (SCENE_SIZE, SCENE_SIZE);
    let half = (SCENE_SIZE / 2, SCENE_SIZE / 2);
    for pass in &seen[..2] {
        let mut expected = Vec::new();
        for (pyramid, _) in PYRAMIDS {
            expected.push((level_input(pyramid, 0), full));
            expected.push((level_input(pyramid, 1), half));
        }
        assert_eq!(pass.levels, expected);
    }
}

#[tokio::test]
async fn dealer_order_is_kept_even_against_frame_order() {
    let seen = run_recorded(&["obs2", "obs1"]).await;
    let ids: Vec<_> = seen[..2]
        .iter()
        .map(|p| p.observation.as_deref().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["obs2", "obs1"]);
    assert_eq!(seen[2].observation.as_deref(), Some("obs1"));
}
