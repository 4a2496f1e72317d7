// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod scheduler;
#[cfg(test)]
mod integration_tests;

pub use scheduler::{RunMode, RunReport, Scheduler};
