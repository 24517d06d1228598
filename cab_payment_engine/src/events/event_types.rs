use serde::{Deserialize, Serialize};

use crate::{
    db_types::{PaymentRecord, PaymentStatus, Transaction},
    traits::GatewayPayment,
};

/// Published once a verified payment has been durably committed to the ledger and the payment record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerifiedEvent {
    pub record: PaymentRecord,
    pub transaction: Transaction,
}

impl PaymentVerifiedEvent {
    pub fn new(record: PaymentRecord, transaction: Transaction) -> Self {
        Self { record, transaction }
    }
}

/// Published once a payment attempt has been durably settled as `AmountMismatch` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRejectedEvent {
    pub record: PaymentRecord,
    /// What the gateway reported for the attempt.
    pub gateway_payment: GatewayPayment,
}

impl PaymentRejectedEvent {
    pub fn new(record: PaymentRecord, gateway_payment: GatewayPayment) -> Self {
        Self { record, gateway_payment }
    }

    pub fn status(&self) -> PaymentStatus {
        self.record.status
    }
}
