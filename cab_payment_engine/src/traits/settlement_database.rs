use std::future::Future;

use crate::{
    db_types::VerifiedPayment,
    traits::{CommitOutcome, PaymentRecordStore, PaymentStoreError, TransactionLedger},
};

/// A backend that can write to the ledger and the payment record store in a single atomic unit of work.
pub trait SettlementDatabase: PaymentRecordStore + TransactionLedger + Send + Sync + 'static {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Commits a verified payment. In one atomic transaction,
    /// * appends a `Payment` entry with the gateway payment id to the ledger,
    /// * moves the order's payment record to `Verified` (compare-and-swap on status).
    ///
    /// Either both writes happen or neither does.
    /// * If the ledger already holds the gateway payment id, nothing is written and the existing entry is returned.
    /// * If the order's record has already left `Pending` (verified with another gateway payment, or settled as
    ///   `AmountMismatch`, `Failed` or `Cancelled`), nothing is written and the stored record is returned.
    fn commit_verified_payment(
        &self,
        payment: VerifiedPayment,
    ) -> impl Future<Output = Result<CommitOutcome, PaymentStoreError>> + Send;

    /// Closes the database connection.
    fn close(&mut self) -> impl Future<Output = Result<(), PaymentStoreError>> + Send {
        async { Ok(()) }
    }
}
