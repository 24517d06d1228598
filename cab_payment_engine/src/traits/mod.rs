//! #  Storage and collaborator contracts.
//!
//! This module defines the interface contracts that the verification engine depends on. Storage backends implement
//! the ledger and record store traits; the gateway and order context traits are implemented by the systems around the
//! engine (a PortOne client, the checkout flow, or test fakes).
//!
//! ## Traits
//! * [`TransactionLedger`] is the append-only ledger of payment and settlement events.
//! * [`PaymentRecordStore`] holds the current settlement state of each order's payment attempt.
//! * [`SettlementDatabase`] composes both stores in a single atomic unit of work.
//! * [`PaymentGateway`] fetches the authoritative state of a payment from the payment provider.
//! * [`OrderContext`] supplies the amount and currency an order expects to be paid.
mod data_objects;
mod order_context;
mod payment_gateway;
mod payment_record_store;
mod settlement_database;
mod transaction_ledger;

pub use data_objects::{CommitOutcome, UpsertResult};
pub use order_context::{ExpectedAmount, OrderContext, OrderContextError};
pub use payment_gateway::{BuyerInfo, GatewayError, GatewayPayment, GatewayPaymentStatus, PaymentGateway};
pub use payment_record_store::{PaymentRecordStore, PaymentStoreError};
pub use settlement_database::SettlementDatabase;
pub use transaction_ledger::{LedgerError, TransactionLedger};

/// SQLite result codes (primary and extended) that indicate another writer holds the lock.
const WRITE_CONFLICT_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

/// Returns true if the error means that a concurrent writer got in the way, and the operation can be retried.
pub(crate) fn is_write_conflict(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(de) => de.code().map(|c| WRITE_CONFLICT_CODES.contains(&c.as_ref())).unwrap_or(false),
        _ => false,
    }
}
