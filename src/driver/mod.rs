// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Batch driver: one freshly built graph per object (or session), run to
//! exhaustion and flushed before the next one starts.
//!
//! Each unit gets its own [`TrainingState`], moved into its trainer, so two
//! objects never share learned state. A unit that fails is reported and the
//! batch moves on; nothing is retried.

pub mod pipelines;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{
    DetectConfig, ModelsConfig, PyramidConfig, RunConfig, SourceKind, TrainConfig,
    TrainSelection, WiringConfig,
};
use crate::engine::{RunReport, Scheduler};
use crate::errors::PipelineError;
use crate::mmod::{TrainedModel, TrainingState, MODEL_TYPE};
use crate::nodes::{read_flat_files, DetectionWriter, DirectorySensor};
use crate::observability::messages::driver::{
    BatchCompleted, ModelsLoaded, NoObservations, ObjectRunFailed, ObjectRunFinished,
    ObjectRunStarted, SessionNotFound,
};
use crate::observability::messages::StructuredLog;
use crate::store::{FsDocumentStore, ModelStore, ObservationStore, StoreError};

use pipelines::{detect_pipeline, train_pipeline, FrameFeed, TrainWriters};

/// How one object or session ended.
#[derive(Debug)]
pub enum UnitOutcome {
    Trained { report: RunReport, templates: usize },
    /// The dealer was empty; the run still flushed.
    NoObservations { report: RunReport },
    Failed(PipelineError),
}

#[derive(Debug)]
pub struct UnitResult {
    /// Object id, or session id in session mode.
    pub unit: String,
    pub outcome: UnitOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<UnitResult>,
    pub duration: Duration,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn trained(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Trained { .. }))
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::NoObservations { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed(_)))
    }

    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.results
            .iter()
            .find(|r| r.unit == unit)
            .map(|r| &r.outcome)
    }

    fn push(&mut self, unit: impl Into<String>, outcome: UnitOutcome) {
        self.results.push(UnitResult {
            unit: unit.into(),
            outcome,
        });
    }
}

/// Runs training batches and detection runs against one set of stores.
pub struct Driver {
    observations: Arc<dyn ObservationStore>,
    models: Arc<dyn ModelStore>,
    pyramid: PyramidConfig,
    wiring: WiringConfig,
}

impl Driver {
    pub fn new(
        observations: Arc<dyn ObservationStore>,
        models: Arc<dyn ModelStore>,
        pyramid: PyramidConfig,
        wiring: WiringConfig,
    ) -> Self {
        Self {
            observations,
            models,
            pyramid,
            wiring,
        }
    }

    /// A driver over the filesystem store named in `config`.
    pub fn from_config(config: &RunConfig) -> Self {
        let store = Arc::new(FsDocumentStore::new(&config.store.root));
        Self::new(
            store.clone(),
            store,
            config.pyramid.clone(),
            config.wiring,
        )
    }

    /// Train whatever `train` selects.
    pub async fn train(&self, train: &TrainConfig) -> Result<BatchReport, PipelineError> {
        match train.selection() {
            TrainSelection::Objects(objects) => Ok(self.train_objects(&objects, train).await),
            TrainSelection::Sessions(sessions) => Ok(self.train_sessions(&sessions, train).await),
            TrainSelection::All => self.train_all(train).await,
        }
    }

    /// Train each object over all of its observations, in the given order.
    pub async fn train_objects(&self, objects: &[String], train: &TrainConfig) -> BatchReport {
        let start = Instant::now();
        let mut batch = BatchReport::default();
        for object_id in objects {
            let outcome = match self.observations.observations_for_object(object_id).await {
                Ok(ids) => self.train_unit(object_id, object_id, ids, train).await,
                Err(e) => self.unit_failed(object_id, e.into()),
            };
            batch.push(object_id, outcome);
        }
        self.finish_batch(batch, start)
    }

    /// Train once per session, each with the session's object and observations.
    /// An unknown session is reported as not found and the batch continues.
    pub async fn train_sessions(&self, sessions: &[String], train: &TrainConfig) -> BatchReport {
        let start = Instant::now();
        let mut batch = BatchReport::default();
        for session_id in sessions {
            let outcome = match self.session_observations(session_id).await {
                Ok((object_id, ids)) => self.train_unit(session_id, &object_id, ids, train).await,
                Err(e) => {
                    if let StoreError::NotFound { .. } = e {
                        SessionNotFound { session_id }.log();
                    }
                    self.unit_failed(session_id, e.into())
                }
            };
            batch.push(session_id, outcome);
        }
        self.finish_batch(batch, start)
    }

    /// Train every distinct object that owns a session, in id order.
    pub async fn train_all(&self, train: &TrainConfig) -> Result<BatchReport, PipelineError> {
        let objects: BTreeSet<String> = self
            .observations
            .sessions()
            .await?
            .into_iter()
            .map(|s| s.object_id)
            .collect();
        let objects: Vec<String> = objects.into_iter().collect();
        Ok(self.train_objects(&objects, train).await)
    }

    async fn session_observations(
        &self,
        session_id: &str,
    ) -> Result<(String, Vec<String>), StoreError> {
        let session = self.observations.session(session_id).await?;
        let ids = self.observations.observations_for_session(session_id).await?;
        Ok((session.object_id, ids))
    }

    async fn train_unit(
        &self,
        unit: &str,
        object_id: &str,
        observation_ids: Vec<String>,
        train: &TrainConfig,
    ) -> UnitOutcome {
        let started = ObjectRunStarted {
            object_id,
            observations: observation_ids.len(),
        };
        let span = started.span(unit);
        started.log();

        async move {
            let empty = observation_ids.is_empty();
            if empty {
                NoObservations { object_id }.log();
            }
            match self.run_training(object_id, observation_ids, train).await {
                Ok((report, templates)) => {
                    ObjectRunFinished {
                        object_id,
                        passes: report.passes,
                        skipped: report.skipped,
                        templates,
                        duration: report.duration,
                    }
                    .log();
                    if empty {
                        UnitOutcome::NoObservations { report }
                    } else {
                        UnitOutcome::Trained { report, templates }
                    }
                }
                Err(e) => self.unit_failed(object_id, e),
            }
        }
        .instrument(span)
        .await
    }

    async fn run_training(
        &self,
        object_id: &str,
        observation_ids: Vec<String>,
        train: &TrainConfig,
    ) -> Result<(RunReport, usize), PipelineError> {
        let writers = TrainWriters {
            models: train.persist.then(|| {
                let parameters = serde_json::json!({
                    "thresh_learn": train.thresh_learn,
                    "n_levels": self.pyramid.n_levels,
                    "level": self.pyramid.level(),
                });
                (Arc::clone(&self.models), parameters)
            }),
            flat_files: train
                .persist
                .then(|| train.flat_file_paths(object_id))
                .flatten(),
        };
        let built = train_pipeline(
            Arc::clone(&self.observations),
            observation_ids,
            TrainingState::new(object_id, train.params()),
            &self.pyramid,
            self.wiring,
            writers,
        )?;
        built.pipeline.set_writers_enabled(train.write_every_pass);

        let report = Scheduler::new(built.pipeline.graph).run_bounded().await?;
        Ok((report, built.templates.load(Ordering::SeqCst)))
    }

    fn unit_failed(&self, unit: &str, error: PipelineError) -> UnitOutcome {
        ObjectRunFailed {
            object_id: unit,
            error: &error,
        }
        .log();
        UnitOutcome::Failed(error)
    }

    fn finish_batch(&self, mut batch: BatchReport, start: Instant) -> BatchReport {
        batch.duration = start.elapsed();
        BatchCompleted {
            trained: batch.trained(),
            empty: batch.empty(),
            failed: batch.failed(),
            duration: batch.duration,
        }
        .log();
        batch
    }

    /// Every model named in `models`, store records first, then flat files.
    pub async fn load_models(
        &self,
        models: &ModelsConfig,
    ) -> Result<Vec<Arc<TrainedModel>>, PipelineError> {
        let mut loaded = Vec::new();
        for object_id in &models.objects {
            let records = self.models.models_for_object(object_id, MODEL_TYPE).await?;
            if records.is_empty() {
                return Err(PipelineError::NotFound(format!(
                    "no {} model for object '{}'",
                    MODEL_TYPE, object_id
                )));
            }
            for record in records {
                loaded.push(Arc::new(record.decode()?));
            }
        }
        let from_store = loaded.len();
        log_models_loaded("store", &loaded);

        for pair in &models.flat_files {
            loaded.push(Arc::new(read_flat_files(&pair.filters, &pair.objects).await?));
        }
        log_models_loaded("flat files", &loaded[from_store..]);

        if loaded.is_empty() {
            return Err(PipelineError::Configuration(
                "you must supply a training file or a stored model".to_string(),
            ));
        }
        Ok(loaded)
    }

    /// Run the tester over a stored session (bounded, flushed at the end) or
    /// a live sensor (until `token` is cancelled).
    pub async fn detect(
        &self,
        detect: &DetectConfig,
        token: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let models = self.load_models(&detect.models).await?;
        let feed = match detect.source {
            SourceKind::Store => {
                let session_id = detect.session.as_deref().ok_or_else(|| {
                    PipelineError::Configuration("a store source needs a session".to_string())
                })?;
                FrameFeed::Store {
                    store: Arc::clone(&self.observations),
                    observation_ids: self.observations.observations_for_session(session_id).await?,
                }
            }
            SourceKind::Live => {
                let sensor = detect.sensor.as_ref().ok_or_else(|| {
                    PipelineError::Configuration("a live source needs a sensor".to_string())
                })?;
                FrameFeed::Live(Box::new(DirectorySensor::open(
                    &sensor.dir,
                    sensor.fps,
                    sensor.looping,
                )?))
            }
        };

        let pipeline = detect_pipeline(
            feed,
            &models,
            detect.matching,
            &self.pyramid,
            self.wiring,
            DetectionWriter::new(detect.debug_dir.clone(), detect.log_path.clone()),
        )?;
        pipeline.set_writers_enabled(detect.write_every_pass);

        let mut scheduler = Scheduler::new(pipeline.graph);
        match detect.source {
            SourceKind::Store => scheduler.run_bounded().await,
            SourceKind::Live => scheduler.run_until_cancelled(token).await,
        }
    }
}

fn log_models_loaded(source: &str, models: &[Arc<TrainedModel>]) {
    if models.is_empty() {
        return;
    }
    ModelsLoaded {
        source,
        models: models.len(),
        templates: models.iter().map(|m| m.objects.template_count()).sum(),
    }
    .log();
}
