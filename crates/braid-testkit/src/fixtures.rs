//! The "things" store
//!
//! A document with a root `things` sequence of point maps (`id`, `x`, `y`), a computed
//! index of those points keyed by id, and an observer bridge to a reactive runtime.
//! Adding a point is one transaction that creates a nested map, inserts it into `things`
//! and writes three keys.

use braid_bridge::ObserverBridge;
use braid_core::{BridgeConfig, ClientId};
use braid_doc::{ApplyOutcome, Content, DocError, Document, MapRef, SequenceRef};
use braid_reactive::{Computed, ReactiveRuntime, Reaction};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A point stored in the `things` sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    /// Point id, also the index key
    pub id: String,
    /// X coordinate
    pub x: i64,
    /// Y coordinate
    pub y: i64,
}

impl Point {
    /// Create a point
    pub fn new(id: impl Into<String>, x: i64, y: i64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
        }
    }

    fn read(map: &MapRef) -> Option<Self> {
        let id = map.get("id").ok()??.as_str()?.to_string();
        let x = map.get("x").ok()??.as_int()?;
        let y = map.get("y").ok()??.as_int()?;
        Some(Self { id, x, y })
    }
}

/// Document, runtime and bridge for the things fixture
pub struct ThingStore {
    /// The replica
    pub doc: Document,
    /// Reactive runtime driven by the bridge
    pub runtime: ReactiveRuntime,
    /// Bridge between `doc` and `runtime`
    pub bridge: ObserverBridge,
    /// Root `things` sequence
    pub things: SequenceRef,
    /// Points keyed by id, derived from `things`
    pub things_map: Computed<IndexMap<String, Point>>,
}

impl ThingStore {
    /// Fresh store for `client`
    pub fn new(client: u64) -> Result<Self, DocError> {
        Self::with_doc(Document::new(ClientId(client)))
    }

    /// Store over an existing document
    pub fn with_doc(doc: Document) -> Result<Self, DocError> {
        let runtime = ReactiveRuntime::new();
        let bridge = ObserverBridge::attach(&doc, Arc::new(runtime.clone()), BridgeConfig::default());
        let things = doc.sequence("things")?;

        let source = things.clone();
        let things_map = runtime.computed(move || {
            let mut points = IndexMap::new();
            for index in 0..source.len().unwrap_or(0) {
                if let Ok(Some(map)) = source.get_map(index) {
                    if let Some(point) = Point::read(&map) {
                        points.insert(point.id.clone(), point);
                    }
                }
            }
            points
        });

        Ok(Self {
            doc,
            runtime,
            bridge,
            things,
            things_map,
        })
    }

    /// Append a point as one transaction
    pub fn add_point(&self, point: &Point) -> Result<MapRef, DocError> {
        self.things.push_map([
            ("id", Content::from(point.id.as_str())),
            ("x", Content::from(point.x)),
            ("y", Content::from(point.y)),
        ])
    }

    /// Current points keyed by id
    pub fn points(&self) -> IndexMap<String, Point> {
        self.things_map.get()
    }

    /// Autorun reading `things_map`; the counter holds the number of runs
    pub fn count_runs(&self) -> (Reaction, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let (map, counter) = (self.things_map.clone(), runs.clone());
        let reaction = self.runtime.autorun(move || {
            map.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (reaction, runs)
    }

    /// Apply everything `other` has that this store is missing
    pub fn sync_from(&self, other: &ThingStore) -> Result<ApplyOutcome, DocError> {
        let update = other.doc.encode_diff(&self.doc.state_vector())?;
        tracing::debug!(
            from = %other.doc.client_id(),
            to = %self.doc.client_id(),
            bytes = update.len(),
            "syncing things store"
        );
        self.doc.apply_update(&update)
    }
}

impl std::fmt::Debug for ThingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingStore")
            .field("doc", &self.doc)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}
