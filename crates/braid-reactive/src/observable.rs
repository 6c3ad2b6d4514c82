//! Observable source values

use crate::runtime::{NodeKind, ReactiveRuntime, RuntimeInner};
use braid_core::ObserverId;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

struct ObservableInner<T> {
    id: ObserverId,
    runtime: Weak<RuntimeInner>,
    value: RwLock<T>,
}

impl<T> Drop for ObservableInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = ReactiveRuntime::upgrade(&self.runtime) {
            runtime.dispose(self.id);
        }
    }
}

/// A value whose reads are tracked and whose writes invalidate dependents
///
/// Cloning yields another handle to the same value.
#[derive(Clone)]
pub struct Observable<T> {
    inner: Arc<ObservableInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub(crate) fn new(runtime: &ReactiveRuntime, value: T) -> Self {
        Self {
            inner: Arc::new(ObservableInner {
                id: runtime.register(NodeKind::Source),
                runtime: runtime.downgrade(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Graph node id of this value
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// Read the value, recording the read against the running computation
    pub fn get(&self) -> T {
        if let Some(runtime) = ReactiveRuntime::upgrade(&self.inner.runtime) {
            runtime.report_read(self.inner.id);
        }
        self.inner.value.read().clone()
    }

    /// Replace the value
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.changed();
    }

    /// Modify the value in place
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.write());
        self.changed();
    }

    fn changed(&self) {
        if let Some(runtime) = ReactiveRuntime::upgrade(&self.inner.runtime) {
            runtime.source_changed(self.inner.id);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
