// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit the same event with structured fields.
//!
//! # Organization
//!
//! * `engine` - scheduler run and pass lifecycle
//! * `graph` - graph wiring and validation
//! * `operators` - trainer, tester and writer events
//! * `driver` - per-object / per-session batch events
//!
//! # Usage Pattern
//!
//! ```rust
//! use mmod_pipeline::observability::messages::engine::PassCompleted;
//! use mmod_pipeline::observability::messages::StructuredLog;
//! use std::time::Duration;
//!
//! let msg = PassCompleted {
//!     pass: 3,
//!     node_count: 8,
//!     duration: Duration::from_millis(12),
//! };
//!
//! msg.log();
//! ```

use tracing::Span;

pub mod driver;
pub mod engine;
pub mod graph;
pub mod operators;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the event at the message's level.
    fn log(&self);

    /// Open a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
