// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Range and consistency checks for a [`RunConfig`].
//!
//! Checks run section by section and accumulate, so a user sees every
//! problem in the file at once rather than fixing them one by one. Graph
//! wiring itself is checked later, when the driver builds each graph.

use crate::config::consts::{MAX_N_LEVELS, MAX_SENSOR_FPS};
use crate::config::{DetectConfig, PyramidConfig, RunConfig, SourceKind, TrainConfig};
use crate::errors::ConfigError;

pub fn validate_run_config(config: &RunConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    validate_pyramid(&config.pyramid, &mut errors);
    if let Some(train) = &config.train {
        validate_train(train, &mut errors);
    }
    if let Some(detect) = &config.detect {
        validate_detect(detect, &mut errors);
    }
    if config.train.is_none() && config.detect.is_none() {
        errors.push(ConfigError::Invalid {
            field: "train/detect",
            message: "at least one of the two sections is required".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_pyramid(pyramid: &PyramidConfig, errors: &mut Vec<ConfigError>) {
    if !(1..=MAX_N_LEVELS).contains(&pyramid.n_levels) {
        errors.push(ConfigError::OutOfRange {
            field: "pyramid.n_levels",
            value: pyramid.n_levels.to_string(),
            range: "1..=16",
        });
    } else if pyramid.level() >= pyramid.n_levels {
        errors.push(ConfigError::Invalid {
            field: "pyramid.level",
            message: format!(
                "level {} does not exist in a {}-level pyramid",
                pyramid.level(),
                pyramid.n_levels
            ),
        });
    }
}

fn validate_train(train: &TrainConfig, errors: &mut Vec<ConfigError>) {
    let selections = [!train.objects.is_empty(), !train.sessions.is_empty(), train.all]
        .iter()
        .filter(|set| **set)
        .count();
    if selections != 1 {
        errors.push(ConfigError::Invalid {
            field: "train",
            message: "set exactly one of 'objects', 'sessions' or 'all'".to_string(),
        });
    }
    if train.objects.iter().chain(&train.sessions).any(|id| id.trim().is_empty()) {
        errors.push(ConfigError::Invalid {
            field: "train",
            message: "object and session ids cannot be blank".to_string(),
        });
    }
    // Anything at or below zero means "learn every view".
    if !train.thresh_learn.is_finite() || train.thresh_learn > 1.0 {
        errors.push(ConfigError::OutOfRange {
            field: "train.thresh_learn",
            value: train.thresh_learn.to_string(),
            range: "..=1.0",
        });
    }
}

fn unit_interval(field: &'static str, value: f32, errors: &mut Vec<ConfigError>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            range: "0.0..=1.0",
        });
    }
}

fn validate_detect(detect: &DetectConfig, errors: &mut Vec<ConfigError>) {
    let m = &detect.matching;
    unit_interval("detect.match.thresh_match", m.thresh_match, errors);
    unit_interval("detect.match.frac_overlap", m.frac_overlap, errors);
    unit_interval("detect.match.color_filter_thresh", m.color_filter_thresh, errors);
    for (field, skip) in [("detect.match.skip_x", m.skip_x), ("detect.match.skip_y", m.skip_y)] {
        if skip == 0 {
            errors.push(ConfigError::OutOfRange {
                field,
                value: skip.to_string(),
                range: "1..",
            });
        }
    }

    if detect.models.is_empty() {
        errors.push(ConfigError::Invalid {
            field: "detect.models",
            message: "you must supply at least one trained model".to_string(),
        });
    }

    match detect.source {
        SourceKind::Store if detect.session.is_none() => {
            errors.push(ConfigError::Invalid {
                field: "detect.session",
                message: "a store source needs the session to replay".to_string(),
            });
        }
        SourceKind::Live => match &detect.sensor {
            None => errors.push(ConfigError::Invalid {
                field: "detect.sensor",
                message: "a live source needs a sensor".to_string(),
            }),
            Some(sensor) if !(sensor.fps > 0.0 && sensor.fps <= MAX_SENSOR_FPS) => {
                errors.push(ConfigError::OutOfRange {
                    field: "detect.sensor.fps",
                    value: sensor.fps.to_string(),
                    range: "(0, 240]",
                });
            }
            Some(_) => {}
        },
        SourceKind::Store => {}
    }
}
