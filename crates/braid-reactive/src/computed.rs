//! Memoised derived values

use crate::runtime::{NodeKind, ReactiveRuntime, RuntimeInner};
use braid_core::ObserverId;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type ComputeFn<T> = Box<dyn Fn() -> T + Send + Sync>;

struct ComputedInner<T> {
    id: ObserverId,
    runtime: Weak<RuntimeInner>,
    compute: ComputeFn<T>,
    cache: Mutex<Option<T>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = ReactiveRuntime::upgrade(&self.runtime) {
            runtime.dispose(self.id);
        }
    }
}

/// A value derived from other reactive values
///
/// The value is recomputed lazily on the first read after something it depends on was
/// invalidated. A computed value is itself an observer: reads made by its computation
/// are tracked against its id, and invalidating that id re-runs everything that read it.
#[derive(Clone)]
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Computed<T> {
    pub(crate) fn new<F>(runtime: &ReactiveRuntime, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ComputedInner {
                id: runtime.register(NodeKind::Computed),
                runtime: runtime.downgrade(),
                compute: Box::new(compute),
                cache: Mutex::new(None),
            }),
        }
    }

    /// Observer id of this computation
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// Current value, recomputing if stale
    pub fn get(&self) -> T {
        let Some(runtime) = ReactiveRuntime::upgrade(&self.inner.runtime) else {
            return (self.inner.compute)();
        };
        runtime.report_read(self.inner.id);

        if !runtime.is_stale(self.inner.id) {
            if let Some(value) = self.inner.cache.lock().clone() {
                return value;
            }
        }

        let value = runtime.track(self.inner.id, || (self.inner.compute)());
        *self.inner.cache.lock() = Some(value.clone());
        value
    }
}

impl<T> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::ReactiveRuntime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_computed_is_memoised() {
        let rt = ReactiveRuntime::new();
        let base = rt.observable(2);
        let evaluations = Arc::new(AtomicUsize::new(0));

        let (source, counter) = (base.clone(), evaluations.clone());
        let doubled = rt.computed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            source.get() * 2
        });

        let reader = doubled.clone();
        let _reaction = rt.autorun(move || {
            reader.get();
        });
        assert_eq!(doubled.get(), 4);
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        base.set(5);
        assert_eq!(doubled.get(), 10);
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unobserved_computed_recomputes_after_change() {
        let rt = ReactiveRuntime::new();
        let base = rt.observable(1);
        let source = base.clone();
        let plus_one = rt.computed(move || source.get() + 1);

        assert_eq!(plus_one.get(), 2);
        base.set(10);
        assert_eq!(plus_one.get(), 11);
    }
}
