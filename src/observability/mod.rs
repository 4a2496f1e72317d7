// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Log lines are never written inline. Every event is a small struct in
//! [`messages`] that implements `Display` for the human-readable text and
//! [`messages::StructuredLog`] for the structured `tracing` event, so the
//! wording lives in one place and fields stay consistent across call sites.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - scheduler run and pass lifecycle
//! * `messages::graph` - graph wiring and validation
//! * `messages::operators` - trainer, tester, sensor and writer events
//! * `messages::driver` - per-object batch events
//!
//! # Usage
//!
//! ```rust
//! use mmod_pipeline::observability::messages::driver::ObjectRunFailed;
//! use mmod_pipeline::observability::messages::StructuredLog;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
//! let msg = ObjectRunFailed {
//!     object_id: "mug",
//!     error: &error,
//! };
//!
//! msg.log();
//! ```

pub mod messages;

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
