use thiserror::Error;

use crate::{
    db_types::OrderId,
    payment_api::verification_objects::VerificationOutcome,
    traits::{GatewayError, LedgerError, OrderContextError, PaymentStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Order {0} was not found")]
    OrderNotFound(OrderId),
    #[error("The payment gateway is unavailable. Try again later. {0}")]
    GatewayUnavailable(String),
    #[error("The payment gateway rejected the payment id. {0}")]
    GatewayRejected(String),
    #[error("Gateway payment {gateway_payment_id} has already been applied to order {order_id}")]
    PaymentAppliedToOtherOrder { gateway_payment_id: String, order_id: String },
    #[error("The payment for order {0} has already been verified")]
    AlreadyVerified(OrderId),
    #[error("{0}")]
    IllegalStatusTransition(String),
    #[error("A concurrent update got in the way. Try again. {0}")]
    StorageConflict(String),
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The verification task did not complete: {0}")]
    TaskFailed(String),
}

impl VerificationError {
    /// Retryable errors left no trace in the payment record store or the ledger, so the caller may call `verify`
    /// again with the same arguments.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerificationError::GatewayUnavailable(_) | VerificationError::StorageConflict(_))
    }

    /// Flattens a retryable error into a [`VerificationOutcome`] with status `RetryableError`, for callers that want
    /// a single result shape. Returns `None` for errors that are not retryable.
    pub fn retryable_outcome(&self, order_id: &OrderId, gateway_payment_id: &str) -> Option<VerificationOutcome> {
        self.is_retryable().then(|| VerificationOutcome::retryable(order_id.clone(), gateway_payment_id))
    }
}

impl From<PaymentStoreError> for VerificationError {
    fn from(e: PaymentStoreError) -> Self {
        match e {
            PaymentStoreError::WriteConflict(s) => VerificationError::StorageConflict(s),
            PaymentStoreError::RecordNotFound(id) => VerificationError::OrderNotFound(id),
            PaymentStoreError::AlreadyVerified(id) => VerificationError::AlreadyVerified(id),
            PaymentStoreError::DuplicateMerchantReference(_) | PaymentStoreError::InvalidSettlementStatus(_) => {
                VerificationError::ValidationError(e.to_string())
            },
            PaymentStoreError::IllegalStatusTransition { .. } => {
                VerificationError::IllegalStatusTransition(e.to_string())
            },
            PaymentStoreError::DatabaseError(s) => VerificationError::DatabaseError(s),
        }
    }
}

impl From<LedgerError> for VerificationError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::WriteConflict(s) => VerificationError::StorageConflict(s),
            e => VerificationError::DatabaseError(e.to_string()),
        }
    }
}

impl From<OrderContextError> for VerificationError {
    fn from(e: OrderContextError) -> Self {
        match e {
            OrderContextError::OrderNotFound(id) => VerificationError::OrderNotFound(id),
            OrderContextError::Unavailable(s) => VerificationError::DatabaseError(s),
        }
    }
}

impl From<GatewayError> for VerificationError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(s) => VerificationError::GatewayUnavailable(s),
            GatewayError::Rejected(s) => VerificationError::GatewayRejected(s),
        }
    }
}
