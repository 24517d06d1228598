use crate::db_types::{PaymentRecord, Transaction};

/// The result of a compare-and-swap write on a payment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertResult {
    /// This call performed the transition.
    Updated(PaymentRecord),
    /// The record had already left `Pending`. The current, unchanged record is returned.
    Unchanged(PaymentRecord),
}

impl UpsertResult {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            UpsertResult::Updated(r) | UpsertResult::Unchanged(r) => r,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, UpsertResult::Updated(_))
    }
}

/// The result of committing a verified payment to the ledger and the record store in one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Both the ledger entry and the record transition were written.
    Committed { record: PaymentRecord, transaction: Transaction },
    /// The gateway payment id is already in the ledger. Nothing was written. The existing entry is returned.
    AlreadyRecorded(Transaction),
    /// The order's record had already left `Pending`, either verified with a different gateway payment or settled
    /// as unverified. Nothing was written. The stored record is returned.
    AlreadySettled(PaymentRecord),
}
