use std::future::Future;

use cab_common::MinorUnits;
use thiserror::Error;

use crate::{
    db_types::{NewPaymentRecord, OrderId, PaymentRecord, PaymentStatus, VerifiedPayment},
    traits::{data_objects::UpsertResult, is_write_conflict, LedgerError},
};

/// Storage for the settlement state of each order's payment attempt. There is at most one record per order.
///
/// Every status change is a compare-and-swap on the current status. A `Verified` record is final and is never
/// touched again by any method on this trait.
pub trait PaymentRecordStore: Clone {
    fn fetch_payment_record(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<Option<PaymentRecord>, PaymentStoreError>> + Send;

    fn fetch_payment_record_by_merchant_reference(
        &self,
        merchant_reference: &str,
    ) -> impl Future<Output = Result<Option<PaymentRecord>, PaymentStoreError>> + Send;

    /// Marks the order's `Pending` record as `Verified`, setting the gateway payment id and verification time. If no
    /// record exists for the order yet, one is created.
    ///
    /// Calling this once the record has left `Pending` is a no-op, and the existing record is returned as
    /// [`UpsertResult::Unchanged`]. A settled attempt is only re-opened by [`PaymentRecordStore::prepare_record`].
    fn upsert_verified(
        &self,
        payment: VerifiedPayment,
    ) -> impl Future<Output = Result<UpsertResult, PaymentStoreError>> + Send;

    /// Settles a `Pending` (or absent) record as `AmountMismatch` or `Failed`. The expected amount and currency are
    /// kept on the record. If the record has already reached a terminal status, it is returned unchanged.
    fn settle_unverified(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
        amount: MinorUnits,
        currency: &str,
    ) -> impl Future<Output = Result<UpsertResult, PaymentStoreError>> + Send;

    /// Creates a `Pending` record for a new payment attempt. A record that settled without being verified is re-armed
    /// with the new merchant reference. Verified orders are refused with [`PaymentStoreError::AlreadyVerified`].
    fn prepare_record(
        &self,
        record: NewPaymentRecord,
    ) -> impl Future<Output = Result<PaymentRecord, PaymentStoreError>> + Send;

    /// Moves a `Pending` record to `Cancelled`.
    fn cancel_record(&self, order_id: &OrderId) -> impl Future<Output = Result<PaymentRecord, PaymentStoreError>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("Internal payment store database error: {0}")]
    DatabaseError(String),
    #[error("A concurrent write blocked the payment store: {0}")]
    WriteConflict(String),
    #[error("No payment record exists for order {0}")]
    RecordNotFound(OrderId),
    #[error("The payment for order {0} has already been verified")]
    AlreadyVerified(OrderId),
    #[error("The merchant reference {0} is already in use")]
    DuplicateMerchantReference(String),
    #[error("Cannot change the payment for order {order_id} from {from} to {to}")]
    IllegalStatusTransition { order_id: OrderId, from: PaymentStatus, to: PaymentStatus },
    #[error("Invalid settlement status: {0}")]
    InvalidSettlementStatus(PaymentStatus),
}

impl PaymentStoreError {
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, PaymentStoreError::WriteConflict(_))
    }
}

impl From<sqlx::Error> for PaymentStoreError {
    fn from(e: sqlx::Error) -> Self {
        if is_write_conflict(&e) {
            PaymentStoreError::WriteConflict(e.to_string())
        } else {
            PaymentStoreError::DatabaseError(e.to_string())
        }
    }
}

impl From<LedgerError> for PaymentStoreError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::WriteConflict(s) => PaymentStoreError::WriteConflict(s),
            e => PaymentStoreError::DatabaseError(e.to_string()),
        }
    }
}
