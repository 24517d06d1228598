use std::fmt::Display;

use cab_common::{MinorUnits, DEFAULT_CURRENCY_CODE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, PaymentRecord, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    Verified,
    AmountMismatch,
    Failed,
    Cancelled,
    Pending,
    /// Nothing was recorded. The same call can be repeated later.
    RetryableError,
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Verified => write!(f, "VERIFIED"),
            VerificationStatus::AmountMismatch => write!(f, "AMOUNT_MISMATCH"),
            VerificationStatus::Failed => write!(f, "FAILED"),
            VerificationStatus::Cancelled => write!(f, "CANCELLED"),
            VerificationStatus::Pending => write!(f, "PENDING"),
            VerificationStatus::RetryableError => write!(f, "RETRYABLE_ERROR"),
        }
    }
}

impl From<PaymentStatus> for VerificationStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => VerificationStatus::Pending,
            PaymentStatus::Verified => VerificationStatus::Verified,
            PaymentStatus::AmountMismatch => VerificationStatus::AmountMismatch,
            PaymentStatus::Failed => VerificationStatus::Failed,
            PaymentStatus::Cancelled => VerificationStatus::Cancelled,
        }
    }
}

/// The caller-facing result of a verification.
///
/// Outcomes are always derived from the stored payment record, so replaying a verification (or losing a race to a
/// concurrent one) yields exactly the same outcome as the call that did the work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub order_id: OrderId,
    pub gateway_payment_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub verified_at: Option<DateTime<Utc>>,
}

impl VerificationOutcome {
    pub fn retryable<S: Into<String>>(order_id: OrderId, gateway_payment_id: S) -> Self {
        Self {
            status: VerificationStatus::RetryableError,
            order_id,
            gateway_payment_id: Some(gateway_payment_id.into()),
            amount: MinorUnits::default(),
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            verified_at: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

impl From<&PaymentRecord> for VerificationOutcome {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            status: record.status.into(),
            order_id: record.order_id.clone(),
            gateway_payment_id: record.gateway_payment_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            verified_at: record.verified_at,
        }
    }
}

impl From<PaymentRecord> for VerificationOutcome {
    fn from(record: PaymentRecord) -> Self {
        Self::from(&record)
    }
}

pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MIN_PAYMENT_AMOUNT: i64 = 100;

/// Tunables for [`crate::VerificationApi`].
#[derive(Debug, Clone)]
pub struct VerificationOptions {
    /// How long to wait for the gateway before giving up with a retryable error.
    pub gateway_timeout: std::time::Duration,
    /// The smallest amount a payment attempt may be prepared for.
    pub min_payment_amount: MinorUnits,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            gateway_timeout: std::time::Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS),
            min_payment_amount: MinorUnits::from(DEFAULT_MIN_PAYMENT_AMOUNT),
        }
    }
}

impl VerificationOptions {
    pub fn with_gateway_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_min_payment_amount(mut self, amount: MinorUnits) -> Self {
        self.min_payment_amount = amount;
        self
    }
}
