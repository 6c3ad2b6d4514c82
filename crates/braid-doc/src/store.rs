//! Replicated container state
//!
//! Sequences follow RGA: every element remembers the element it was inserted after,
//! and concurrent inserts after the same element are ordered by descending id. Map keys
//! are last-writer-wins by id. Deletions leave tombstones so later operations can still
//! find their origin.
//!
//! Local edits and remote operations go through the same [`Store::integrate`] path, so
//! both produce the same mutation records.

use crate::content::{Content, Value};
use crate::error::DocError;
use crate::index::ContainerIndex;
use crate::update::{OpContent, Operation, StateVector};
use braid_core::{
    ChangeKind, ClientId, ContainerId, ContainerKind, ItemId, MutationRecord, Origin,
    TransactionId,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Records and operations produced by one transaction
#[derive(Debug)]
pub(crate) struct TxnBuffer {
    pub id: TransactionId,
    pub origin: Origin,
    pub records: Vec<MutationRecord>,
    pub ops: Vec<Operation>,
}

impl TxnBuffer {
    pub fn new(id: TransactionId, origin: Origin) -> Self {
        Self {
            id,
            origin,
            records: Vec::new(),
            ops: Vec::new(),
        }
    }

    fn record(&mut self, container: ContainerId, change: ChangeKind) {
        tracing::trace!(
            transaction = self.id.value(),
            container = %container,
            change = %change,
            "mutation"
        );
        self.records
            .push(MutationRecord::new(self.id, container, change));
    }
}

/// Result of integrating one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Integration {
    Applied,
    Duplicate,
    Missing,
}

/// Counters describing one remote update application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Operations integrated (including previously pending ones that became ready)
    pub integrated: usize,
    /// Operations already known to this replica
    pub duplicates: usize,
    /// Operations rejected as malformed for this replica
    pub rejected: usize,
    /// Operations still waiting for causal dependencies
    pub pending: usize,
    /// Pending operations discarded because the pending buffer overflowed
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct SeqItem {
    id: ItemId,
    value: Value,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct MapEntry {
    id: ItemId,
    value: Option<Value>,
}

#[derive(Debug, Clone)]
enum Body {
    Map(BTreeMap<String, MapEntry>),
    Sequence(Vec<SeqItem>),
}

impl Body {
    fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Map => Body::Map(BTreeMap::new()),
            ContainerKind::Sequence => Body::Sequence(Vec::new()),
        }
    }

    fn kind(&self) -> ContainerKind {
        match self {
            Body::Map(_) => ContainerKind::Map,
            Body::Sequence(_) => ContainerKind::Sequence,
        }
    }
}

pub(crate) struct Store {
    client: ClientId,
    clock: u64,
    containers: HashMap<ContainerId, Body>,
    state_vector: StateVector,
    seen: HashSet<ItemId>,
    history: Vec<Operation>,
    pending: Vec<Operation>,
    max_pending: usize,
    index: ContainerIndex,
}

impl Store {
    pub fn new(client: ClientId, index: ContainerIndex, max_pending: usize) -> Self {
        Self {
            client,
            clock: 0,
            containers: HashMap::new(),
            state_vector: StateVector::new(),
            seen: HashSet::new(),
            history: Vec::new(),
            pending: Vec::new(),
            max_pending,
            index,
        }
    }

    pub fn state_vector(&self) -> &StateVector {
        &self.state_vector
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations not covered by `remote`, in integration order
    pub fn diff(&self, remote: &StateVector) -> Vec<Operation> {
        self.history
            .iter()
            .filter(|op| !remote.covers(op.id()))
            .cloned()
            .collect()
    }

    fn next_id(&mut self) -> ItemId {
        self.clock += 1;
        ItemId::new(self.client, self.clock)
    }

    /// Look up or create a root container
    pub fn ensure_root(&mut self, name: &str, kind: ContainerKind) -> Result<ContainerId, DocError> {
        let id = ContainerId::root(name);
        match self.containers.get(&id) {
            Some(body) if body.kind() != kind => Err(DocError::KindMismatch {
                container: id,
                expected: kind,
                actual: body.kind(),
            }),
            Some(_) => Ok(id),
            None => {
                self.containers.insert(id.clone(), Body::empty(kind));
                self.index.register(id.clone(), None);
                Ok(id)
            }
        }
    }

    pub fn kind_of(&self, container: &ContainerId) -> Option<ContainerKind> {
        self.containers.get(container).map(Body::kind)
    }

    fn sequence(&self, container: &ContainerId) -> Result<&Vec<SeqItem>, DocError> {
        match self.containers.get(container) {
            Some(Body::Sequence(items)) => Ok(items),
            Some(body) => Err(DocError::KindMismatch {
                container: container.clone(),
                expected: ContainerKind::Sequence,
                actual: body.kind(),
            }),
            None => Err(DocError::UnknownContainer {
                container: container.clone(),
            }),
        }
    }

    fn map(&self, container: &ContainerId) -> Result<&BTreeMap<String, MapEntry>, DocError> {
        match self.containers.get(container) {
            Some(Body::Map(entries)) => Ok(entries),
            Some(body) => Err(DocError::KindMismatch {
                container: container.clone(),
                expected: ContainerKind::Map,
                actual: body.kind(),
            }),
            None => Err(DocError::UnknownContainer {
                container: container.clone(),
            }),
        }
    }

    // === Reads ===

    pub fn seq_len(&self, container: &ContainerId) -> Result<usize, DocError> {
        Ok(self.sequence(container)?.iter().filter(|i| !i.deleted).count())
    }

    pub fn seq_get(&self, container: &ContainerId, index: usize) -> Result<Option<Value>, DocError> {
        Ok(self
            .sequence(container)?
            .iter()
            .filter(|i| !i.deleted)
            .nth(index)
            .map(|i| i.value.clone()))
    }

    pub fn seq_values(&self, container: &ContainerId) -> Result<Vec<Value>, DocError> {
        Ok(self
            .sequence(container)?
            .iter()
            .filter(|i| !i.deleted)
            .map(|i| i.value.clone())
            .collect())
    }

    pub fn map_get(&self, container: &ContainerId, key: &str) -> Result<Option<Value>, DocError> {
        Ok(self
            .map(container)?
            .get(key)
            .and_then(|entry| entry.value.clone()))
    }

    pub fn map_entries(&self, container: &ContainerId) -> Result<Vec<(String, Value)>, DocError> {
        Ok(self
            .map(container)?
            .iter()
            .filter_map(|(k, e)| e.value.clone().map(|v| (k.clone(), v)))
            .collect())
    }

    // === Integration ===

    /// Integrate one operation, local or remote
    pub fn integrate(&mut self, op: &Operation, buf: &mut TxnBuffer) -> Result<Integration, DocError> {
        let id = op.id();
        if self.seen.contains(&id) {
            return Ok(Integration::Duplicate);
        }

        let parent = op.parent().clone();
        match (&parent, self.kind_of(&parent)) {
            (_, Some(kind)) if kind != op.parent_kind() => {
                return Err(DocError::KindMismatch {
                    container: parent,
                    expected: op.parent_kind(),
                    actual: kind,
                })
            }
            (_, Some(_)) => {}
            (ContainerId::Root(name), None) => {
                self.ensure_root(name, op.parent_kind())?;
            }
            (ContainerId::Nested(_), None) => return Ok(Integration::Missing),
        }

        match op {
            Operation::Insert {
                origin, content, ..
            } => {
                let items = self.sequence(&parent)?;
                let mut pos = match origin {
                    None => 0,
                    Some(origin) => match items.iter().position(|item| item.id == *origin) {
                        Some(p) => p + 1,
                        None => return Ok(Integration::Missing),
                    },
                };
                while pos < items.len() && items[pos].id > id {
                    pos += 1;
                }

                let value = self.materialize(id, &parent, content, buf);
                if let Some(Body::Sequence(items)) = self.containers.get_mut(&parent) {
                    items.insert(
                        pos,
                        SeqItem {
                            id,
                            value,
                            deleted: false,
                        },
                    );
                }
                buf.record(parent, ChangeKind::Insert);
            }
            Operation::Set { key, content, .. } => {
                let wins = self.map(&parent)?.get(key).map_or(true, |e| id > e.id);
                let value = self.materialize(id, &parent, content, buf);
                if wins {
                    if let Some(Body::Map(entries)) = self.containers.get_mut(&parent) {
                        entries.insert(
                            key.clone(),
                            MapEntry {
                                id,
                                value: Some(value),
                            },
                        );
                    }
                    buf.record(parent, ChangeKind::Update);
                }
            }
            Operation::Remove { key, .. } => {
                let current = self.map(&parent)?.get(key).map(|e| (e.id, e.value.is_some()));
                let (wins, had_value) = match current {
                    None => (true, false),
                    Some((existing, had_value)) => (id > existing, had_value),
                };
                if wins {
                    if let Some(Body::Map(entries)) = self.containers.get_mut(&parent) {
                        entries.insert(key.clone(), MapEntry { id, value: None });
                    }
                    if had_value {
                        buf.record(parent, ChangeKind::Delete);
                    }
                }
            }
            Operation::Delete { target, .. } => {
                let Some(Body::Sequence(items)) = self.containers.get_mut(&parent) else {
                    return Ok(Integration::Missing);
                };
                let Some(item) = items.iter_mut().find(|item| item.id == *target) else {
                    return Ok(Integration::Missing);
                };
                if !item.deleted {
                    item.deleted = true;
                    buf.record(parent, ChangeKind::Delete);
                }
            }
        }

        self.seen.insert(id);
        self.state_vector.observe(id);
        self.clock = self.clock.max(id.clock);
        self.history.push(op.clone());
        buf.ops.push(op.clone());
        Ok(Integration::Applied)
    }

    fn materialize(
        &mut self,
        id: ItemId,
        parent: &ContainerId,
        content: &OpContent,
        buf: &mut TxnBuffer,
    ) -> Value {
        match content {
            OpContent::Value(value) => value.clone(),
            OpContent::Container(kind) => {
                let container = ContainerId::Nested(id);
                self.containers
                    .entry(container.clone())
                    .or_insert_with(|| Body::empty(*kind));
                self.index.register(container.clone(), Some(parent.clone()));
                buf.record(container.clone(), ChangeKind::Created);
                Value::Container(container)
            }
        }
    }

    /// Integrate a remote batch plus any pending operations that became ready
    pub fn apply_remote(&mut self, ops: Vec<Operation>, buf: &mut TxnBuffer) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let mut queue = std::mem::take(&mut self.pending);
        queue.extend(ops);

        loop {
            let mut progressed = false;
            let mut waiting = Vec::new();
            for op in queue.drain(..) {
                match self.integrate(&op, buf) {
                    Ok(Integration::Applied) => {
                        outcome.integrated += 1;
                        progressed = true;
                    }
                    Ok(Integration::Duplicate) => outcome.duplicates += 1,
                    Ok(Integration::Missing) => waiting.push(op),
                    Err(err) => {
                        tracing::warn!(op = %op.id(), error = %err, "rejecting remote operation");
                        outcome.rejected += 1;
                    }
                }
            }
            queue = waiting;
            if !progressed || queue.is_empty() {
                break;
            }
        }

        if queue.len() > self.max_pending {
            let overflow = queue.len() - self.max_pending;
            tracing::warn!(
                dropped = overflow,
                limit = self.max_pending,
                "pending operation buffer full, dropping oldest"
            );
            queue.drain(..overflow);
            outcome.dropped = overflow;
        }
        outcome.pending = queue.len();
        self.pending = queue;
        outcome
    }

    // === Local edits ===

    pub fn local_insert(
        &mut self,
        parent: &ContainerId,
        index: usize,
        content: Content,
        buf: &mut TxnBuffer,
    ) -> Result<Value, DocError> {
        let origin = {
            let visible: Vec<ItemId> = self
                .sequence(parent)?
                .iter()
                .filter(|i| !i.deleted)
                .map(|i| i.id)
                .collect();
            if index > visible.len() {
                return Err(DocError::IndexOutOfBounds {
                    container: parent.clone(),
                    index,
                    len: visible.len(),
                });
            }
            index.checked_sub(1).map(|prev| visible[prev])
        };

        let id = self.next_id();
        let (content, children) = split_content(content);
        let scalar = content.scalar();
        let op = Operation::Insert {
            id,
            parent: parent.clone(),
            origin,
            content,
        };
        self.integrate(&op, buf)?;
        self.populate(id, scalar, children, buf)
    }

    pub fn local_set(
        &mut self,
        parent: &ContainerId,
        key: &str,
        content: Content,
        buf: &mut TxnBuffer,
    ) -> Result<Value, DocError> {
        self.map(parent)?;
        let id = self.next_id();
        let (content, children) = split_content(content);
        let scalar = content.scalar();
        let op = Operation::Set {
            id,
            parent: parent.clone(),
            key: key.to_string(),
            content,
        };
        self.integrate(&op, buf)?;
        self.populate(id, scalar, children, buf)
    }

    pub fn local_remove(
        &mut self,
        parent: &ContainerId,
        key: &str,
        buf: &mut TxnBuffer,
    ) -> Result<bool, DocError> {
        let present = self
            .map(parent)?
            .get(key)
            .is_some_and(|e| e.value.is_some());
        if !present {
            return Ok(false);
        }
        let op = Operation::Remove {
            id: self.next_id(),
            parent: parent.clone(),
            key: key.to_string(),
        };
        self.integrate(&op, buf)?;
        Ok(true)
    }

    pub fn local_delete(
        &mut self,
        parent: &ContainerId,
        index: usize,
        len: usize,
        buf: &mut TxnBuffer,
    ) -> Result<(), DocError> {
        let targets: Vec<ItemId> = {
            let visible: Vec<ItemId> = self
                .sequence(parent)?
                .iter()
                .filter(|i| !i.deleted)
                .map(|i| i.id)
                .collect();
            let end = index.saturating_add(len);
            if end > visible.len() {
                return Err(DocError::IndexOutOfBounds {
                    container: parent.clone(),
                    index: end,
                    len: visible.len(),
                });
            }
            visible[index..end].to_vec()
        };

        for target in targets {
            let op = Operation::Delete {
                id: self.next_id(),
                parent: parent.clone(),
                target,
            };
            self.integrate(&op, buf)?;
        }
        Ok(())
    }

    fn populate(
        &mut self,
        id: ItemId,
        scalar: Value,
        children: Option<Children>,
        buf: &mut TxnBuffer,
    ) -> Result<Value, DocError> {
        let container = ContainerId::Nested(id);
        match children {
            None => Ok(scalar),
            Some(Children::Map(entries)) => {
                for (key, child) in entries {
                    self.local_set(&container, &key, child, buf)?;
                }
                Ok(Value::Container(container))
            }
            Some(Children::Sequence(items)) => {
                for (i, child) in items.into_iter().enumerate() {
                    self.local_insert(&container, i, child, buf)?;
                }
                Ok(Value::Container(container))
            }
        }
    }
}

enum Children {
    Map(Vec<(String, Content)>),
    Sequence(Vec<Content>),
}

impl OpContent {
    fn scalar(&self) -> Value {
        match self {
            OpContent::Value(value) => value.clone(),
            OpContent::Container(_) => Value::Null,
        }
    }
}

fn split_content(content: Content) -> (OpContent, Option<Children>) {
    match content {
        Content::Value(Value::Container(_)) => (OpContent::Value(Value::Null), None),
        Content::Value(value) => (OpContent::Value(value), None),
        Content::Map(entries) => (
            OpContent::Container(ContainerKind::Map),
            Some(Children::Map(entries)),
        ),
        Content::Sequence(items) => (
            OpContent::Container(ContainerKind::Sequence),
            Some(Children::Sequence(items)),
        ),
    }
}
