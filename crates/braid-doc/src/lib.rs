//! # Braid Document
//!
//! A replicated document of nested maps and sequences. Replicas exchange bincode-encoded
//! updates and converge regardless of delivery order or duplication.
//!
//! The document is the mutation source for the observer bridge: every committed
//! transaction is delivered to registered [`MutationSink`](braid_core::MutationSink)s
//! as an explicit begin/record/end stream, and container reads are reported to
//! [`ReadTracker`](braid_core::ReadTracker)s. The [`ContainerIndex`] answers ancestry
//! questions by container identity.
//!
//! ```ignore
//! let doc = Document::new(ClientId(1));
//! let things = doc.sequence("things")?;
//! doc.transact(|_| things.push_map([("id", "1"), ("x", "3")]))?;
//! ```

#![forbid(unsafe_code)]

mod content;
mod document;
mod error;
mod index;
mod refs;
mod store;
mod update;

pub use content::{Content, Value};
pub use document::{Document, ObserverKey, UpdateListener};
pub use error::DocError;
pub use index::ContainerIndex;
pub use refs::{MapRef, SequenceRef};
pub use store::ApplyOutcome;
pub use update::{OpContent, Operation, StateVector, Update};
