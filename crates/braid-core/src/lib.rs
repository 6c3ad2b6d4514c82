//! Braid Core - shared vocabulary for the CRDT/reactive bridge
//!
//! This crate holds the types every other Braid crate agrees on. It has no
//! behaviour of its own beyond configuration loading.
//!
//! # Layers
//!
//! ## Identifiers
//! - [`ContainerId`]: stable, location-independent identity of a map or sequence
//! - [`TransactionId`] + [`Origin`]: batch boundaries of the mutation stream
//! - [`ObserverId`]: the reactive engine's invalidation handle
//!
//! ## Mutation stream
//! - [`MutationRecord`]: one low-level change to one container inside a transaction
//!
//! ## Collaborator seams
//! - [`MutationSink`], [`ContainerResolver`], [`ReadTracker`]: what a document offers
//! - [`ReactiveEngine`], [`ObserverLifecycle`]: what a reactive engine offers
//!
//! The bridge is written against these traits only, so it can be exercised with any
//! document or engine that implements them.

#![forbid(unsafe_code)]

/// Workspace configuration (bridge, runtime, document, replication)
pub mod config;

/// Unified error handling
pub mod errors;

/// Client, item, container, transaction and observer identifiers
pub mod identifiers;

/// Mutation records emitted by documents
pub mod mutation;

/// Collaborator traits between document, bridge and reactive engine
pub mod traits;

pub use config::{
    BraidConfig, BridgeConfig, ConfigError, DocumentConfig, ReplicationConfig, RuntimeConfig,
};
pub use errors::{BraidError, Result};
pub use identifiers::{
    ClientId, ContainerId, ContainerKind, ItemId, ObserverId, Origin, TransactionId,
};
pub use mutation::{ChangeKind, MutationRecord};
pub use traits::{
    Ancestry, ContainerResolver, MutationSink, ObserverLifecycle, ReactiveEngine, ReadTracker,
};
