//! The replicated document
//!
//! # Transactions
//!
//! Every change happens inside a transaction. [`Document::transact`] groups the writes made
//! by its closure into one local transaction; nested calls join the outermost one. A write
//! made outside `transact` is a transaction of its own, and every
//! [`Document::apply_update`] call is one remote transaction.
//!
//! When a transaction commits, the document releases its state lock and then delivers
//! the transaction to each registered [`MutationSink`] as `begin`, one `record` per
//! integrated operation, and `end`. Update listeners receive the encoded operations
//! afterwards. Listeners may read and write the document from inside these callbacks;
//! such writes form new transactions.
//!
//! Delivery goes through a commit outbox. A transaction committed while another is
//! being delivered waits in the outbox until that delivery has reached every sink and
//! update listener, so each sink sees whole transactions in commit order. One delivery
//! pass hands out at most `max_commit_cascade` such nested commits; the rest stay queued
//! until the next commit or [`Document::flush_commits`].
//!
//! # Reads
//!
//! Container reads notify the registered [`ReadTracker`]s after the state lock is
//! released, so a tracker may call back into the document.

use crate::error::DocError;
use crate::index::ContainerIndex;
use crate::refs::{MapRef, SequenceRef};
use crate::store::{ApplyOutcome, Store, TxnBuffer};
use crate::update::{StateVector, Update};
use braid_core::{
    ClientId, ContainerId, ContainerKind, DocumentConfig, MutationSink, Origin, ReadTracker,
    TransactionId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Callback receiving the encoded operations of each committed transaction
pub type UpdateListener = Arc<dyn Fn(&[u8], Origin) + Send + Sync>;

/// Handle returned when registering a listener, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverKey(u64);

struct OpenTxn {
    buf: TxnBuffer,
    depth: usize,
}

struct DocState {
    store: Store,
    next_txn: u64,
    open: Option<OpenTxn>,
}

impl DocState {
    fn allocate(&mut self) -> TransactionId {
        self.next_txn += 1;
        TransactionId::new(self.next_txn)
    }
}

#[derive(Default)]
struct Observers {
    next_key: u64,
    sinks: Vec<(ObserverKey, Arc<dyn MutationSink>)>,
    readers: Vec<(ObserverKey, Arc<dyn ReadTracker>)>,
    updates: Vec<(ObserverKey, UpdateListener)>,
}

impl Observers {
    fn key(&mut self) -> ObserverKey {
        self.next_key += 1;
        ObserverKey(self.next_key)
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<TxnBuffer>,
    delivering: bool,
}

struct DocInner {
    client: ClientId,
    config: DocumentConfig,
    state: Mutex<DocState>,
    outbox: Mutex<Outbox>,
    observers: RwLock<Observers>,
    index: ContainerIndex,
}

/// A replica of a shared document
///
/// Cloning is cheap and yields another handle to the same replica.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocInner>,
}

/// Ends the local transaction scope it was created for
struct TxnScope<'a> {
    doc: &'a Document,
}

impl Drop for TxnScope<'_> {
    fn drop(&mut self) {
        self.doc.exit_local();
    }
}

impl Document {
    /// Create an empty replica for the given client
    pub fn new(client: ClientId) -> Self {
        Self::with_config(client, DocumentConfig::default())
    }

    /// Create an empty replica with explicit settings
    pub fn with_config(client: ClientId, config: DocumentConfig) -> Self {
        let index = ContainerIndex::new();
        let store = Store::new(client, index.clone(), config.max_pending_operations);
        Self {
            inner: Arc::new(DocInner {
                client,
                config,
                state: Mutex::new(DocState {
                    store,
                    next_txn: 0,
                    open: None,
                }),
                outbox: Mutex::new(Outbox::default()),
                observers: RwLock::new(Observers::default()),
                index,
            }),
        }
    }

    /// This replica's client id
    pub fn client_id(&self) -> ClientId {
        self.inner.client
    }

    /// Settings this replica was created with
    pub fn config(&self) -> &DocumentConfig {
        &self.inner.config
    }

    /// Ancestry index for every container this replica has seen
    pub fn container_index(&self) -> ContainerIndex {
        self.inner.index.clone()
    }

    /// Root sequence with the given name, created on first use
    pub fn sequence(&self, name: &str) -> Result<SequenceRef, DocError> {
        let id = self
            .inner
            .state
            .lock()
            .store
            .ensure_root(name, ContainerKind::Sequence)?;
        Ok(SequenceRef::new(self.clone(), id))
    }

    /// Root map with the given name, created on first use
    pub fn map(&self, name: &str) -> Result<MapRef, DocError> {
        let id = self
            .inner
            .state
            .lock()
            .store
            .ensure_root(name, ContainerKind::Map)?;
        Ok(MapRef::new(self.clone(), id))
    }

    /// Existing sequence by id
    pub fn sequence_ref(&self, id: &ContainerId) -> Result<SequenceRef, DocError> {
        self.expect_kind(id, ContainerKind::Sequence)?;
        Ok(SequenceRef::new(self.clone(), id.clone()))
    }

    /// Existing map by id
    pub fn map_ref(&self, id: &ContainerId) -> Result<MapRef, DocError> {
        self.expect_kind(id, ContainerKind::Map)?;
        Ok(MapRef::new(self.clone(), id.clone()))
    }

    fn expect_kind(&self, id: &ContainerId, expected: ContainerKind) -> Result<(), DocError> {
        match self.inner.state.lock().store.kind_of(id) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(DocError::KindMismatch {
                container: id.clone(),
                expected,
                actual,
            }),
            None => Err(DocError::UnknownContainer {
                container: id.clone(),
            }),
        }
    }

    /// Run `f` inside one local transaction
    ///
    /// Writes made by `f` are committed together when the outermost `transact` returns.
    /// Writes are not rolled back if `f` returns an error.
    pub fn transact<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let _scope = self.enter_local();
        f(self)
    }

    fn enter_local(&self) -> TxnScope<'_> {
        let mut state = self.inner.state.lock();
        match state.open.as_mut() {
            Some(open) => open.depth += 1,
            None => {
                let id = state.allocate();
                state.open = Some(OpenTxn {
                    buf: TxnBuffer::new(id, Origin::Local),
                    depth: 1,
                });
            }
        }
        TxnScope { doc: self }
    }

    fn exit_local(&self) {
        let finished = {
            let mut state = self.inner.state.lock();
            match state.open.as_mut() {
                Some(open) if open.depth > 1 => {
                    open.depth -= 1;
                    None
                }
                Some(_) => state.open.take().map(|open| open.buf),
                None => None,
            }
        };
        if let Some(buf) = finished {
            self.dispatch(buf);
        }
    }

    /// Apply a write to the open local transaction, opening one if needed
    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Store, &mut TxnBuffer) -> Result<R, DocError>,
    ) -> Result<R, DocError> {
        let _scope = self.enter_local();
        let mut state = self.inner.state.lock();
        let DocState {
            store,
            next_txn,
            open,
        } = &mut *state;
        let open = open.get_or_insert_with(|| {
            *next_txn += 1;
            OpenTxn {
                buf: TxnBuffer::new(TransactionId::new(*next_txn), Origin::Local),
                depth: 1,
            }
        });
        f(store, &mut open.buf)
    }

    /// Read from a container and notify read trackers once the lock is released
    pub(crate) fn read<R>(
        &self,
        container: &ContainerId,
        f: impl FnOnce(&Store) -> Result<R, DocError>,
    ) -> Result<R, DocError> {
        let result = f(&self.inner.state.lock().store)?;
        let readers: Vec<_> = self
            .inner
            .observers
            .read()
            .readers
            .iter()
            .map(|(_, reader)| reader.clone())
            .collect();
        for reader in readers {
            reader.container_read(container);
        }
        Ok(result)
    }

    /// Queue a committed transaction and deliver, unless a delivery is already running
    fn dispatch(&self, buf: TxnBuffer) {
        {
            let mut outbox = self.inner.outbox.lock();
            outbox.queue.push_back(buf);
            if outbox.delivering {
                tracing::debug!(
                    queued = outbox.queue.len(),
                    "commit during delivery; queued behind current transaction"
                );
                return;
            }
            outbox.delivering = true;
        }
        self.deliver_queued();
    }

    /// Deliver queued commits in order
    fn deliver_queued(&self) -> usize {
        let limit = self.inner.config.max_commit_cascade;
        let mut delivered = 0;
        loop {
            let next = {
                let mut outbox = self.inner.outbox.lock();
                // the first commit of a pass is not a nested one
                if delivered > limit && !outbox.queue.is_empty() {
                    outbox.delivering = false;
                    tracing::error!(
                        limit,
                        remaining = outbox.queue.len(),
                        "commit cascade limit reached; remaining commits stay queued"
                    );
                    return delivered;
                }
                match outbox.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        outbox.delivering = false;
                        return delivered;
                    }
                }
            };
            self.deliver(next);
            delivered += 1;
        }
    }

    /// Deliver commits left queued by a pass that hit the cascade limit
    ///
    /// Returns the number delivered. Does nothing while a delivery is running.
    pub fn flush_commits(&self) -> usize {
        {
            let mut outbox = self.inner.outbox.lock();
            if outbox.delivering || outbox.queue.is_empty() {
                return 0;
            }
            outbox.delivering = true;
        }
        self.deliver_queued()
    }

    /// Committed transactions not yet delivered
    pub fn queued_commits(&self) -> usize {
        self.inner.outbox.lock().queue.len()
    }

    fn deliver(&self, buf: TxnBuffer) {
        let TxnBuffer {
            id,
            origin,
            records,
            ops,
        } = buf;
        tracing::debug!(
            transaction = id.value(),
            origin = %origin,
            records = records.len(),
            ops = ops.len(),
            "transaction committed"
        );

        let (sinks, updates) = {
            let observers = self.inner.observers.read();
            let sinks: Vec<_> = observers.sinks.iter().map(|(_, s)| s.clone()).collect();
            let updates: Vec<_> = observers.updates.iter().map(|(_, u)| u.clone()).collect();
            (sinks, updates)
        };

        for sink in &sinks {
            sink.begin(id, origin);
            for record in &records {
                sink.record(record.clone());
            }
            sink.end(id);
        }

        if ops.is_empty() || updates.is_empty() {
            return;
        }
        match Update::new(ops).encode() {
            Ok(bytes) => {
                for listener in &updates {
                    listener(&bytes, origin);
                }
            }
            Err(err) => {
                tracing::error!(transaction = id.value(), error = %err, "failed to encode update");
            }
        }
    }

    // === Listeners ===

    /// Register a receiver for the mutation stream
    pub fn add_mutation_sink(&self, sink: Arc<dyn MutationSink>) -> ObserverKey {
        let mut observers = self.inner.observers.write();
        let key = observers.key();
        observers.sinks.push((key, sink));
        key
    }

    /// Register a hook fired on container reads
    pub fn add_read_tracker(&self, tracker: Arc<dyn ReadTracker>) -> ObserverKey {
        let mut observers = self.inner.observers.write();
        let key = observers.key();
        observers.readers.push((key, tracker));
        key
    }

    /// Register a callback receiving each committed transaction's encoded operations
    pub fn on_update<F>(&self, listener: F) -> ObserverKey
    where
        F: Fn(&[u8], Origin) + Send + Sync + 'static,
    {
        let mut observers = self.inner.observers.write();
        let key = observers.key();
        observers.updates.push((key, Arc::new(listener)));
        key
    }

    /// Remove a listener of any kind; returns whether it was registered
    pub fn remove_listener(&self, key: ObserverKey) -> bool {
        let mut observers = self.inner.observers.write();
        let before = observers.sinks.len() + observers.readers.len() + observers.updates.len();
        observers.sinks.retain(|(k, _)| *k != key);
        observers.readers.retain(|(k, _)| *k != key);
        observers.updates.retain(|(k, _)| *k != key);
        before != observers.sinks.len() + observers.readers.len() + observers.updates.len()
    }

    // === Replication ===

    /// Operations this replica has integrated, per client
    pub fn state_vector(&self) -> StateVector {
        self.inner.state.lock().store.state_vector().clone()
    }

    /// Encode the whole document as one update
    pub fn encode_state_as_update(&self) -> Result<Vec<u8>, DocError> {
        self.encode_diff(&StateVector::new())
    }

    /// Encode the operations a peer with state `remote` is missing
    pub fn encode_diff(&self, remote: &StateVector) -> Result<Vec<u8>, DocError> {
        let ops = self.inner.state.lock().store.diff(remote);
        Update::new(ops).encode()
    }

    /// Apply an encoded update from another replica as one remote transaction
    ///
    /// Operations already integrated are skipped. Operations whose causal dependencies
    /// have not arrived yet are kept and retried on later updates.
    pub fn apply_update(&self, bytes: &[u8]) -> Result<ApplyOutcome, DocError> {
        let update = Update::decode(bytes)?;
        let (buf, outcome) = {
            let mut state = self.inner.state.lock();
            if state.open.is_some() {
                return Err(DocError::TransactionInProgress);
            }
            let id = state.allocate();
            let mut buf = TxnBuffer::new(id, Origin::Remote);
            let outcome = state.store.apply_remote(update.ops, &mut buf);
            (buf, outcome)
        };
        tracing::debug!(
            transaction = buf.id.value(),
            integrated = outcome.integrated,
            duplicates = outcome.duplicates,
            pending = outcome.pending,
            "applied remote update"
        );
        self.dispatch(buf);
        Ok(outcome)
    }

    /// Remote operations waiting for missing dependencies
    pub fn pending_operations(&self) -> usize {
        self.inner.state.lock().store.pending_len()
    }
}

impl Default for Document {
    /// An empty replica with a random client id
    fn default() -> Self {
        Self::new(ClientId::random())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("client", &self.inner.client)
            .field("containers", &self.inner.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use braid_core::{ChangeKind, MutationRecord};

    #[derive(Default)]
    struct Log {
        events: Mutex<Vec<String>>,
    }

    impl MutationSink for Log {
        fn begin(&self, transaction: TransactionId, origin: Origin) {
            self.events.lock().push(format!("begin {transaction} {origin}"));
        }

        fn record(&self, record: MutationRecord) {
            self.events
                .lock()
                .push(format!("{} {}", record.change, record.container));
        }

        fn end(&self, transaction: TransactionId) {
            self.events.lock().push(format!("end {transaction}"));
        }
    }

    #[test]
    fn test_transact_groups_writes() {
        let doc = Document::new(ClientId(1));
        let log = Arc::new(Log::default());
        doc.add_mutation_sink(log.clone());
        let things = doc.sequence("things").unwrap();

        doc.transact(|_| {
            things.push("a").unwrap();
            things.push("b").unwrap();
        });

        let events = log.events.lock().clone();
        assert_eq!(events.first().map(String::as_str), Some("begin txn-1 local"));
        assert_eq!(events.last().map(String::as_str), Some("end txn-1"));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_nested_transact_joins_outer() {
        let doc = Document::new(ClientId(1));
        let log = Arc::new(Log::default());
        doc.add_mutation_sink(log.clone());
        let things = doc.sequence("things").unwrap();

        doc.transact(|doc| {
            things.push(1).unwrap();
            doc.transact(|_| things.push(2).unwrap());
            assert!(log.events.lock().is_empty());
        });

        let begins = log
            .events
            .lock()
            .iter()
            .filter(|e| e.starts_with("begin"))
            .count();
        assert_eq!(begins, 1);
    }

    #[test]
    fn test_composite_insert_records() {
        let doc = Document::new(ClientId(1));
        let log = Arc::new(Log::default());
        doc.add_mutation_sink(log.clone());
        let things = doc.sequence("things").unwrap();

        let point = things
            .push_map([("id", Content::from("1")), ("x", Content::from(3))])
            .unwrap();

        let events = log.events.lock().clone();
        let nested = point.id().clone();
        assert_eq!(
            events,
            vec![
                "begin txn-1 local".to_string(),
                format!("{} {}", ChangeKind::Created, nested),
                format!("{} {}", ChangeKind::Insert, ContainerId::root("things")),
                format!("{} {}", ChangeKind::Update, nested),
                format!("{} {}", ChangeKind::Update, nested),
                "end txn-1".to_string(),
            ]
        );
    }

    #[test]
    fn test_apply_update_inside_transaction_fails() {
        let source = Document::new(ClientId(1));
        source.sequence("things").unwrap().push(1).unwrap();
        let update = source.encode_state_as_update().unwrap();

        let doc = Document::new(ClientId(2));
        let result = doc.transact(|doc| doc.apply_update(&update));
        assert_eq!(result, Err(DocError::TransactionInProgress));
    }

    #[test]
    fn test_remove_listener() {
        let doc = Document::new(ClientId(1));
        let log = Arc::new(Log::default());
        let key = doc.add_mutation_sink(log.clone());
        assert!(doc.remove_listener(key));
        assert!(!doc.remove_listener(key));

        doc.sequence("things").unwrap().push(1).unwrap();
        assert!(log.events.lock().is_empty());
    }

    #[test]
    fn test_update_listener_sees_local_ops() {
        let doc = Document::new(ClientId(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        doc.on_update(move |bytes, origin| sink.lock().push((bytes.to_vec(), origin)));

        doc.sequence("things").unwrap().push("a").unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, Origin::Local);
        assert_eq!(Update::decode(&seen[0].0).unwrap().ops.len(), 1);
    }

    /// Writes once to `target` when the first transaction it sees ends
    struct WriteOnEnd {
        target: SequenceRef,
        fired: Mutex<bool>,
    }

    impl MutationSink for WriteOnEnd {
        fn begin(&self, _transaction: TransactionId, _origin: Origin) {}

        fn record(&self, _record: MutationRecord) {}

        fn end(&self, _transaction: TransactionId) {
            let first = !std::mem::replace(&mut *self.fired.lock(), true);
            if first {
                self.target.push("echo").unwrap();
            }
        }
    }

    #[test]
    fn test_commit_during_delivery_waits_for_every_sink() {
        let doc = Document::new(ClientId(1));
        let writer = Arc::new(WriteOnEnd {
            target: doc.sequence("echo").unwrap(),
            fired: Mutex::new(false),
        });
        let log = Arc::new(Log::default());
        doc.add_mutation_sink(writer);
        doc.add_mutation_sink(log.clone());

        doc.sequence("list").unwrap().push(1).unwrap();

        assert_eq!(
            *log.events.lock(),
            vec![
                "begin txn-1 local",
                "insert root:list",
                "end txn-1",
                "begin txn-2 local",
                "insert root:echo",
                "end txn-2",
            ]
        );
        assert_eq!(doc.queued_commits(), 0);
    }

    #[test]
    fn test_default_replicas_get_distinct_clients() {
        let (one, two) = (Document::default(), Document::default());
        assert_ne!(one.client_id(), two.client_id());

        one.sequence("list").unwrap().push("a").unwrap();
        two.apply_update(&one.encode_state_as_update().unwrap()).unwrap();
        assert_eq!(two.sequence("list").unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_kind_mismatch_on_root() {
        let doc = Document::new(ClientId(1));
        doc.sequence("things").unwrap();
        assert!(matches!(
            doc.map("things"),
            Err(DocError::KindMismatch { .. })
        ));
    }

}
