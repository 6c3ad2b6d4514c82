//! Per-transaction lifecycle

use std::fmt;

/// Where a transaction is in its trip through the bridge
///
/// Phases only move forward, one step at a time, except that a transaction with no
/// records goes straight from `Open` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransactionPhase {
    /// Begun, no records yet
    Open,
    /// At least one record buffered
    Accumulating,
    /// Ended; the buffer has been reduced to a touched set
    Closed,
    /// Reduced to the set of observers to invalidate
    Deduplicated,
    /// Every observer has been invalidated
    Emitted,
}

impl TransactionPhase {
    /// Whether `next` is a legal successor of this phase
    pub fn can_advance_to(self, next: TransactionPhase) -> bool {
        use TransactionPhase::*;
        matches!(
            (self, next),
            (Open, Accumulating)
                | (Open, Closed)
                | (Accumulating, Accumulating)
                | (Accumulating, Closed)
                | (Closed, Deduplicated)
                | (Deduplicated, Emitted)
        )
    }

    /// Move to `next`, returning the rejected pair on an illegal transition
    pub fn advance(&mut self, next: TransactionPhase) -> Result<(), (Self, Self)> {
        if self.can_advance_to(next) {
            *self = next;
            Ok(())
        } else {
            Err((*self, next))
        }
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Accumulating => "accumulating",
            Self::Closed => "closed",
            Self::Deduplicated => "deduplicated",
            Self::Emitted => "emitted",
        };
        f.write_str(label)
    }
}
