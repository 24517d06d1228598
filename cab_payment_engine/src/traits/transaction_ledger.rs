use std::future::Future;

use thiserror::Error;

use crate::{
    db_types::{NewTransaction, Transaction},
    traits::is_write_conflict,
};

/// The append-only ledger of payment and settlement events.
///
/// Entries are never updated or deleted. The gateway payment id, when present, is unique across the whole ledger, and
/// this is what protects against crediting a duplicate gateway callback twice.
pub trait TransactionLedger: Clone {
    /// Appends a new entry to the ledger.
    ///
    /// If an entry with the same gateway payment id already exists, [`LedgerError::DuplicateTransaction`] is returned
    /// and nothing is written. Callers should treat this as "already recorded".
    fn record_transaction(
        &self,
        transaction: NewTransaction,
    ) -> impl Future<Output = Result<Transaction, LedgerError>> + Send;

    /// Fetches all ledger entries for the given entity (usually an order id), in creation order.
    fn fetch_transactions_for_entity(
        &self,
        related_entity_id: &str,
    ) -> impl Future<Output = Result<Vec<Transaction>, LedgerError>> + Send;

    fn fetch_transaction_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> impl Future<Output = Result<Option<Transaction>, LedgerError>> + Send;

    fn fetch_transaction(
        &self,
        transaction_id: i64,
    ) -> impl Future<Output = Result<Option<Transaction>, LedgerError>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal ledger database error: {0}")]
    DatabaseError(String),
    #[error("A transaction for gateway payment {0} has already been recorded")]
    DuplicateTransaction(String),
    #[error("A concurrent write blocked the ledger: {0}")]
    WriteConflict(String),
}

impl LedgerError {
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, LedgerError::WriteConflict(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if is_write_conflict(&e) {
            LedgerError::WriteConflict(e.to_string())
        } else {
            LedgerError::DatabaseError(e.to_string())
        }
    }
}
