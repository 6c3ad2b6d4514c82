//! Replication coordinator
//!
//! Serialises inbound updates for one document. Updates are applied one at a time, each
//! as its own remote transaction, so the bridge attached to the document sees one closed
//! transaction per update no matter how updates arrive. An update delivered while
//! another is being applied (for example from a reaction reacting to the first) is queued
//! and applied after it.
//!
//! An update that meets an open local transaction on the document stays at the head of
//! the queue. The drain stops there and resumes on the next delivery, the next drain, or
//! the next commit on the document that carries operations.

use crate::error::ReplicationError;
use braid_core::{Origin, ReplicationConfig};
use braid_doc::{ApplyOutcome, DocError, Document, ObserverKey};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Summary of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Updates applied
    pub applied: usize,
    /// Updates the document rejected
    pub failed: usize,
    /// Operations integrated across all applied updates
    pub integrated: usize,
}

impl DrainReport {
    fn add(&mut self, outcome: &ApplyOutcome) {
        self.applied += 1;
        self.integrated += outcome.integrated;
    }
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<Vec<u8>>,
    draining: bool,
}

/// Inbound update queue for one document
pub struct ReplicationCoordinator {
    doc: Document,
    config: ReplicationConfig,
    inbox: Mutex<Inbox>,
    retry_key: ObserverKey,
}

impl ReplicationCoordinator {
    /// Create a coordinator for `doc`
    pub fn new(doc: Document, config: ReplicationConfig) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let retry = this.clone();
            let key = doc.on_update(move |_, _| {
                if let Some(coordinator) = retry.upgrade() {
                    if coordinator.queued() > 0 {
                        coordinator.drain();
                    }
                }
            });
            Self {
                doc,
                config,
                inbox: Mutex::new(Inbox::default()),
                retry_key: key,
            }
        })
    }

    /// The document updates are applied to
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Updates waiting to be applied
    pub fn queued(&self) -> usize {
        self.inbox.lock().queue.len()
    }

    /// Queue an encoded update without applying it
    pub fn enqueue(&self, update: Vec<u8>) -> Result<(), ReplicationError> {
        let mut inbox = self.inbox.lock();
        if inbox.queue.len() >= self.config.max_queued_updates {
            return Err(ReplicationError::QueueFull {
                capacity: self.config.max_queued_updates,
            });
        }
        inbox.queue.push_back(update);
        Ok(())
    }

    /// Queue an update and drain the queue, unless a drain is already running
    pub fn deliver(&self, update: Vec<u8>) -> Result<DrainReport, ReplicationError> {
        self.enqueue(update)?;
        Ok(self.drain())
    }

    /// Apply queued updates in arrival order
    ///
    /// Rejected updates are logged and counted, and the drain continues with the next
    /// one. An update blocked by an open local transaction is put back at the head of the
    /// queue and ends the drain. Returns an empty report when called during another drain;
    /// that drain picks up anything queued in the meantime.
    pub fn drain(&self) -> DrainReport {
        {
            let mut inbox = self.inbox.lock();
            if inbox.draining {
                return DrainReport::default();
            }
            inbox.draining = true;
        }

        let mut report = DrainReport::default();
        loop {
            let next = {
                let mut inbox = self.inbox.lock();
                match inbox.queue.pop_front() {
                    Some(update) => update,
                    None => {
                        inbox.draining = false;
                        break;
                    }
                }
            };
            match self.doc.apply_update(&next) {
                Ok(outcome) => report.add(&outcome),
                Err(DocError::TransactionInProgress) => {
                    let mut inbox = self.inbox.lock();
                    inbox.queue.push_front(next);
                    inbox.draining = false;
                    tracing::debug!(
                        client = %self.doc.client_id(),
                        queued = inbox.queue.len(),
                        "local transaction open; holding inbound updates"
                    );
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        client = %self.doc.client_id(),
                        error = %ReplicationError::from(err),
                        "rejected inbound update"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.applied + report.failed > 0 {
            tracing::debug!(
                client = %self.doc.client_id(),
                applied = report.applied,
                failed = report.failed,
                integrated = report.integrated,
                "drained inbound updates"
            );
        }
        report
    }

    /// Forward updates committed on `from`'s document to `to`
    ///
    /// Only locally originated updates are forwarded unless `from` is configured with
    /// `forward_remote_updates`. The target is held weakly. Returns the listener key on
    /// `from`'s document.
    pub fn link(from: &Arc<Self>, to: &Arc<Self>) -> ObserverKey {
        let target = Arc::downgrade(to);
        let forward_remote = from.config.forward_remote_updates;
        from.doc.on_update(move |bytes, origin| {
            if origin == Origin::Remote && !forward_remote {
                return;
            }
            let Some(target) = target.upgrade() else {
                return;
            };
            if let Err(err) = target.deliver(bytes.to_vec()) {
                tracing::warn!(error = %err, "failed to forward update");
            }
        })
    }
}

impl Drop for ReplicationCoordinator {
    fn drop(&mut self) {
        self.doc.remove_listener(self.retry_key);
    }
}

impl std::fmt::Debug for ReplicationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationCoordinator")
            .field("doc", &self.doc)
            .field("queued", &self.queued())
            .finish()
    }
}
