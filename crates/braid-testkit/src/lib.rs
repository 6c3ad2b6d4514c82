//! # Braid Testkit
//!
//! Shared fixtures for Braid tests.
//!
//! - [`init_tracing`]: env-filtered `tracing` output for tests (`RUST_LOG=braid=debug`)
//! - [`RecordingEngine`]: a [`ReactiveEngine`](braid_core::ReactiveEngine) that records
//!   every invalidation and lets tests drive tracking by hand
//! - [`ThingStore`]: a document holding a `things` sequence of point maps, a computed
//!   index of those points keyed by id, and a bridge wiring both together
//! - [`strategies`]: proptest strategies for points and edit scripts

#![forbid(unsafe_code)]

mod engine;
mod fixtures;
pub mod strategies;

pub use engine::{Invalidation, RecordingEngine};
pub use fixtures::{Point, ThingStore};
pub use strategies::Delivery;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process
///
/// Output goes through the test harness's capture and is filtered by `RUST_LOG`
/// (default `warn`).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
