//! Side-effecting reactions

use crate::runtime::{ReactiveRuntime, RuntimeInner};
use braid_core::ObserverId;
use std::sync::Weak;

/// A running autorun
///
/// Dropping the handle disposes the reaction.
pub struct Reaction {
    id: ObserverId,
    runtime: Weak<RuntimeInner>,
}

impl Reaction {
    pub(crate) fn new(runtime: &ReactiveRuntime, id: ObserverId) -> Self {
        Self {
            id,
            runtime: runtime.downgrade(),
        }
    }

    /// Observer id of this reaction
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Whether the reaction has been disposed
    pub fn is_disposed(&self) -> bool {
        ReactiveRuntime::upgrade(&self.runtime).map_or(true, |runtime| !runtime.contains(self.id))
    }

    /// Stop the reaction; it will never run again
    pub fn dispose(&self) {
        if let Some(runtime) = ReactiveRuntime::upgrade(&self.runtime) {
            runtime.dispose(self.id);
        }
    }
}

impl Drop for Reaction {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction").field("id", &self.id).finish()
    }
}
