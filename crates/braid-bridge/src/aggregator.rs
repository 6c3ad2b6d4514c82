//! Transaction aggregation
//!
//! The aggregator buffers mutation records per open transaction and, when the
//! transaction ends, reduces the buffer to a [`TouchedSet`]: the distinct containers the
//! transaction touched, in first-touch order, each with the kinds of change it saw.
//! Nothing leaves the aggregator before the transaction's end.
//!
//! Transaction ids increase monotonically per document, so any id at or below the
//! highest closed id that is not currently open is treated as closed.

use crate::error::{BridgeError, SequencingFault};
use crate::phase::TransactionPhase;
use braid_core::{ChangeKind, ContainerId, MutationRecord, Origin, TransactionId};
use indexmap::IndexMap;

/// Change kinds observed on one container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    /// The container was created
    pub created: bool,
    /// Something was inserted
    pub inserted: bool,
    /// Something was deleted or removed
    pub deleted: bool,
    /// A key was written
    pub updated: bool,
}

impl ChangeFlags {
    fn mark(&mut self, change: ChangeKind) {
        match change {
            ChangeKind::Created => self.created = true,
            ChangeKind::Insert => self.inserted = true,
            ChangeKind::Delete => self.deleted = true,
            ChangeKind::Update => self.updated = true,
        }
    }
}

/// Distinct containers touched by one transaction, in first-touch order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchedSet {
    containers: IndexMap<ContainerId, ChangeFlags>,
    records: usize,
}

impl TouchedSet {
    fn touch(&mut self, container: ContainerId, change: ChangeKind) {
        self.containers.entry(container).or_default().mark(change);
        self.records += 1;
    }

    /// Touched containers in first-touch order
    pub fn containers(&self) -> impl Iterator<Item = &ContainerId> {
        self.containers.keys()
    }

    /// Changes seen on a container
    pub fn flags(&self, container: &ContainerId) -> Option<ChangeFlags> {
        self.containers.get(container).copied()
    }

    /// Number of distinct containers
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether no container was touched
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Number of records folded into this set
    pub fn record_count(&self) -> usize {
        self.records
    }
}

/// A transaction that has ended and is ready for deduplication
#[derive(Debug, Clone)]
pub struct ClosedTransaction {
    /// Transaction id
    pub id: TransactionId,
    /// Origin shared by all its records
    pub origin: Origin,
    /// Containers it touched
    pub touched: TouchedSet,
    /// Current phase, starting at `Closed`
    pub phase: TransactionPhase,
}

#[derive(Debug)]
struct Buffer {
    origin: Origin,
    phase: TransactionPhase,
    records: Vec<MutationRecord>,
    overflow: TouchedSet,
}

/// Buffers records per transaction until the transaction ends
#[derive(Debug)]
pub struct TransactionAggregator {
    open: IndexMap<TransactionId, Buffer>,
    highest_closed: Option<TransactionId>,
    max_records: usize,
}

impl TransactionAggregator {
    /// Create an aggregator buffering at most `max_records` records per transaction
    ///
    /// Records past the limit are folded straight into the touched set, so no container
    /// is lost.
    pub fn new(max_records: usize) -> Self {
        Self {
            open: IndexMap::new(),
            highest_closed: None,
            max_records,
        }
    }

    fn is_closed(&self, transaction: TransactionId) -> bool {
        !self.open.contains_key(&transaction)
            && self.highest_closed.is_some_and(|high| transaction <= high)
    }

    fn fault(&self, transaction: TransactionId) -> BridgeError {
        let fault = if self.is_closed(transaction) {
            SequencingFault::AlreadyClosed
        } else {
            SequencingFault::UnknownTransaction
        };
        BridgeError::sequencing(transaction, fault)
    }

    /// Open a buffer for a transaction
    pub fn begin(&mut self, transaction: TransactionId, origin: Origin) -> Result<(), BridgeError> {
        if self.open.contains_key(&transaction) {
            return Err(BridgeError::sequencing(
                transaction,
                SequencingFault::DuplicateBegin,
            ));
        }
        if self.is_closed(transaction) {
            return Err(BridgeError::sequencing(
                transaction,
                SequencingFault::AlreadyClosed,
            ));
        }
        self.open.insert(
            transaction,
            Buffer {
                origin,
                phase: TransactionPhase::Open,
                records: Vec::new(),
                overflow: TouchedSet::default(),
            },
        );
        Ok(())
    }

    /// Buffer one record for its open transaction
    pub fn on_mutation(&mut self, record: MutationRecord) -> Result<(), BridgeError> {
        let max_records = self.max_records;
        let Some(buffer) = self.open.get_mut(&record.transaction) else {
            return Err(self.fault(record.transaction));
        };
        if buffer.phase.advance(TransactionPhase::Accumulating).is_err() {
            return Err(BridgeError::sequencing(
                record.transaction,
                SequencingFault::AlreadyClosed,
            ));
        }
        if buffer.records.len() < max_records {
            buffer.records.push(record);
        } else {
            buffer.overflow.touch(record.container, record.change);
        }
        Ok(())
    }

    /// Close a transaction and reduce its buffer to a touched set
    pub fn on_transaction_end(
        &mut self,
        transaction: TransactionId,
    ) -> Result<ClosedTransaction, BridgeError> {
        let Some(mut buffer) = self.open.shift_remove(&transaction) else {
            return Err(self.fault(transaction));
        };
        if buffer.overflow.record_count() > 0 {
            tracing::debug!(
                transaction = transaction.value(),
                overflow = buffer.overflow.record_count(),
                "transaction exceeded record buffer"
            );
        }
        self.highest_closed = Some(
            self.highest_closed
                .map_or(transaction, |high| high.max(transaction)),
        );

        let mut touched = TouchedSet::default();
        for record in buffer.records {
            touched.touch(record.container, record.change);
        }
        for (container, flags) in buffer.overflow.containers {
            let entry = touched.containers.entry(container).or_default();
            entry.created |= flags.created;
            entry.inserted |= flags.inserted;
            entry.deleted |= flags.deleted;
            entry.updated |= flags.updated;
        }
        touched.records += buffer.overflow.records;

        if let Err((from, to)) = buffer.phase.advance(TransactionPhase::Closed) {
            tracing::error!(
                transaction = transaction.value(),
                from = %from,
                to = %to,
                "illegal transaction phase transition"
            );
        }
        Ok(ClosedTransaction {
            id: transaction,
            origin: buffer.origin,
            touched,
            phase: buffer.phase,
        })
    }

    /// Number of transactions currently open
    pub fn open_transactions(&self) -> usize {
        self.open.len()
    }
}
