//! # Braid Bridge
//!
//! Change-coalescing observer bridge between a replicated document and a reactive
//! engine. A transaction that touches containers through any number of low-level
//! operations invalidates each subscribed observer exactly once, whether the
//! transaction was local or replayed from a remote update.
//!
//! ## Components
//!
//! - [`TransactionAggregator`]: buffers records per transaction until it ends
//! - [`PathDeduplicator`]: reduces touched containers to the observers to invalidate
//! - [`SubscriptionRegistry`]: which observers read which containers
//! - [`NotificationEmitter`]: one engine batch per transaction
//! - [`ObserverBridge`] / [`BridgeCore`]: wiring and the emission queue
//! - [`ReplicationCoordinator`]: applies inbound updates one remote transaction at a time
//!
//! ```ignore
//! let doc = Document::new(ClientId(1));
//! let runtime = ReactiveRuntime::new();
//! let bridge = ObserverBridge::attach(&doc, Arc::new(runtime.clone()), BridgeConfig::default());
//! ```

#![forbid(unsafe_code)]

mod aggregator;
mod bridge;
mod dedup;
mod emitter;
mod error;
mod phase;
mod registry;
mod replication;

pub use aggregator::{ChangeFlags, ClosedTransaction, TouchedSet, TransactionAggregator};
pub use bridge::{BridgeCore, BridgeStats, ObserverBridge};
pub use dedup::{DedupOutcome, PathDeduplicator};
pub use emitter::NotificationEmitter;
pub use error::{BridgeError, ReplicationError, SequencingFault};
pub use phase::TransactionPhase;
pub use registry::SubscriptionRegistry;
pub use replication::{DrainReport, ReplicationCoordinator};
