// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::consts::{DEFAULT_N_LEVELS, DEFAULT_SENSOR_FPS, DEFAULT_THRESH_LEARN};
use crate::errors::{ConfigError, PipelineError};
use crate::mmod::{MatchParams, TrainParams};

/// A complete run description, loaded from a YAML file.
///
/// One file can carry both a `train` and a `detect` section; the command
/// line picks which one runs.
///
/// # Example
/// ```yaml
/// store:
///   root: ./data
/// pyramid:
///   n_levels: 3
/// wiring:
///   depth: mandatory
///   mask: optional
/// train:
///   objects: [mug, bowl]
///   thresh_learn: 0.97
///   flat_files: ./out
/// detect:
///   source: live
///   sensor:
///     dir: ./recording
///     fps: 15
///   models:
///     objects: [mug]
///   match:
///     thresh_match: 0.9
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub pyramid: PyramidConfig,
    #[serde(default)]
    pub wiring: WiringConfig,
    pub train: Option<TrainConfig>,
    pub detect: Option<DetectConfig>,
}

impl RunConfig {
    pub fn train_section(&self) -> Result<&TrainConfig, PipelineError> {
        self.train.as_ref().ok_or_else(|| {
            PipelineError::Configuration(
                ConfigError::MissingSection {
                    section: "train",
                    mode: "train",
                }
                .to_string(),
            )
        })
    }

    pub fn detect_section(&self) -> Result<&DetectConfig, PipelineError> {
        self.detect.as_ref().ok_or_else(|| {
            PipelineError::Configuration(
                ConfigError::MissingSection {
                    section: "detect",
                    mode: "detect",
                }
                .to_string(),
            )
        })
    }
}

/// Root directory of the filesystem document store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    pub n_levels: usize,
    /// Level handed to the trainer or tester; the coarsest when unset.
    pub level: Option<usize>,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            n_levels: DEFAULT_N_LEVELS,
            level: None,
        }
    }
}

impl PyramidConfig {
    pub fn level(&self) -> usize {
        self.level.unwrap_or(self.n_levels.saturating_sub(1))
    }
}

/// Whether a missing channel fails the pass or just withholds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Mandatory,
    Optional,
}

impl Channel {
    pub fn is_mandatory(self) -> bool {
        self == Channel::Mandatory
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    pub depth: Channel,
    pub mask: Channel,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self {
            depth: Channel::Mandatory,
            mask: Channel::Optional,
        }
    }
}

/// Which objects a training batch covers.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainSelection {
    Objects(Vec<String>),
    Sessions(Vec<String>),
    /// Every object that has at least one session.
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub objects: Vec<String>,
    pub sessions: Vec<String>,
    pub all: bool,
    pub thresh_learn: f32,
    /// Wire the model writer and flat-file persister at all.
    pub persist: bool,
    /// Enable the writers' gates so they also write on every pass.
    pub write_every_pass: bool,
    /// Directory receiving `<object>.filters.jsonl` and `<object>.objects.jsonl`.
    pub flat_files: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            sessions: Vec::new(),
            all: false,
            thresh_learn: DEFAULT_THRESH_LEARN,
            persist: true,
            write_every_pass: false,
            flat_files: None,
        }
    }
}

impl TrainConfig {
    /// Validation guarantees exactly one selection is set; objects win otherwise.
    pub fn selection(&self) -> TrainSelection {
        if !self.objects.is_empty() {
            TrainSelection::Objects(self.objects.clone())
        } else if !self.sessions.is_empty() {
            TrainSelection::Sessions(self.sessions.clone())
        } else {
            TrainSelection::All
        }
    }

    pub fn params(&self) -> TrainParams {
        TrainParams {
            thresh_learn: self.thresh_learn,
        }
    }

    pub fn flat_file_paths(&self, object_id: &str) -> Option<(PathBuf, PathBuf)> {
        self.flat_files.as_ref().map(|dir| {
            (
                dir.join(format!("{}.filters.jsonl", object_id)),
                dir.join(format!("{}.objects.jsonl", object_id)),
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Replay the observations of one session from the document store.
    #[default]
    Store,
    /// Frames from a live sensor until cancelled.
    Live,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub dir: PathBuf,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

fn default_fps() -> f64 {
    DEFAULT_SENSOR_FPS
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlatFilePair {
    pub filters: PathBuf,
    pub objects: PathBuf,
}

/// Where the tester's models come from. Both lists may be combined.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub objects: Vec<String>,
    pub flat_files: Vec<FlatFilePair>,
}

impl ModelsConfig {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.flat_files.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub source: SourceKind,
    /// Session replayed when `source` is `store`.
    pub session: Option<String>,
    pub sensor: Option<SensorConfig>,
    pub models: ModelsConfig,
    #[serde(rename = "match")]
    pub matching: MatchParams,
    pub write_every_pass: bool,
    pub debug_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Store,
            session: None,
            sensor: None,
            models: ModelsConfig::default(),
            matching: MatchParams::default(),
            write_every_pass: true,
            debug_dir: None,
            log_path: None,
        }
    }
}

/// Load a run configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig, PipelineError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_yaml::from_str(&content).map_err(|e| {
        PipelineError::Configuration(format!("cannot parse {}: {}", path.display(), e))
    })
}

/// Load a run configuration and range-check it, reporting every problem at once.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<RunConfig, PipelineError> {
    let cfg = load_config(path)?;

    if let Err(problems) = crate::config::validate_run_config(&cfg) {
        let messages: Vec<String> = problems.iter().map(|e| e.to_string()).collect();
        return Err(PipelineError::Configuration(format!(
            "Configuration validation failed:\n{}",
            messages.join("\n")
        )));
    }

    Ok(cfg)
}
