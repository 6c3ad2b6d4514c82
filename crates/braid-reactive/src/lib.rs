//! # Braid Reactive
//!
//! A small transparent-reactive runtime in the style of observable/computed/autorun
//! libraries. Reads are tracked automatically while a computation runs; writes and
//! explicit invalidations re-run dependent reactions once per batch.
//!
//! [`ReactiveRuntime`] implements [`ReactiveEngine`](braid_core::ReactiveEngine), so
//! foreign state (such as a replicated document) can drive it by invalidating observer
//! ids directly.
//!
//! ```ignore
//! let rt = ReactiveRuntime::new();
//! let count = rt.observable(1);
//! let doubled = { let c = count.clone(); rt.computed(move || c.get() * 2) };
//! let _log = rt.autorun(move || println!("{}", doubled.get()));
//! count.set(2);
//! ```

#![forbid(unsafe_code)]

mod computed;
mod error;
mod observable;
mod reaction;
mod runtime;

pub use computed::Computed;
pub use error::ReactiveError;
pub use observable::Observable;
pub use reaction::Reaction;
pub use runtime::{ReactiveRuntime, RuntimeStats};
