// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default number of pyramid levels (full resolution plus two halvings)
pub const DEFAULT_N_LEVELS: usize = 3;
/// Upper bound on pyramid levels; 2^15 halvings exceed any real sensor
pub const MAX_N_LEVELS: usize = 16;

/// Views at least this similar to an existing template are not learned
pub const DEFAULT_THRESH_LEARN: f32 = 0.97;
/// Minimum template score for a candidate match
pub const DEFAULT_THRESH_MATCH: f32 = 0.95;
/// Candidates overlapping a stronger match by more than this are suppressed
pub const DEFAULT_FRAC_OVERLAP: f32 = 0.6;
/// Minimum hue histogram agreement for a match to be confirmed
pub const DEFAULT_COLOR_FILTER_THRESH: f32 = 0.91;
/// Horizontal sliding-window stride in pixels
pub const DEFAULT_SKIP_X: u32 = 8;
/// Vertical sliding-window stride in pixels
pub const DEFAULT_SKIP_Y: u32 = 8;

/// Replay sensor frame rate when none is configured
pub const DEFAULT_SENSOR_FPS: f64 = 30.0;
/// Maximum frame rate accepted for the replay sensor
pub const MAX_SENSOR_FPS: f64 = 240.0;

/// File names inside an observation directory of the filesystem store
pub const OBSERVATION_DOCUMENT: &str = "observation.json";
pub const IMAGE_FILE: &str = "image.png";
pub const DEPTH_FILE: &str = "depth.png";
pub const MASK_FILE: &str = "mask.png";
