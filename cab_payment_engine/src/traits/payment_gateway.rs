use std::{fmt::Display, future::Future, str::FromStr};

use cab_common::MinorUnits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The payment provider's authoritative view of a payment.
pub trait PaymentGateway: Clone + Send + Sync + 'static {
    /// Fetches the current status, amount and currency of the payment with the given gateway id.
    ///
    /// Implementations must return [`GatewayError::Rejected`] only when the provider positively reports that it does
    /// not know the payment. Every transport or provider-side failure is [`GatewayError::Unavailable`].
    fn fetch_payment_status(
        &self,
        gateway_payment_id: &str,
    ) -> impl Future<Output = Result<GatewayPayment, GatewayError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub gateway_payment_id: String,
    pub status: GatewayPaymentStatus,
    pub amount: MinorUnits,
    pub currency: String,
    pub buyer: BuyerInfo,
    /// The payment method reported by the gateway, e.g. `card` or `vbank`.
    pub method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl GatewayPayment {
    pub fn new<S: Into<String>>(gateway_payment_id: S, status: GatewayPaymentStatus, amount: MinorUnits) -> Self {
        Self {
            gateway_payment_id: gateway_payment_id.into(),
            status,
            amount,
            currency: cab_common::DEFAULT_CURRENCY_CODE.to_string(),
            buyer: BuyerInfo::default(),
            method: None,
            paid_at: None,
        }
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_buyer(mut self, buyer: BuyerInfo) -> Self {
        self.buyer = buyer;
        self
    }

    pub fn with_method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_paid_at(mut self, paid_at: DateTime<Utc>) -> Self {
        self.paid_at = Some(paid_at);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
    Ready,
    Pending,
    Paid,
    Failed,
    Cancelled,
    PartialCancelled,
    VirtualAccountIssued,
    Other(String),
}

impl GatewayPaymentStatus {
    /// Only a fully paid payment may be credited. Everything else settles the attempt as failed.
    pub fn is_paid(&self) -> bool {
        matches!(self, GatewayPaymentStatus::Paid)
    }
}

impl FromStr for GatewayPaymentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "READY" => Self::Ready,
            "PENDING" => Self::Pending,
            "PAID" => Self::Paid,
            "FAILED" => Self::Failed,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            "PARTIAL_CANCELLED" => Self::PartialCancelled,
            "VIRTUAL_ACCOUNT_ISSUED" => Self::VirtualAccountIssued,
            _ => Self::Other(s.trim().to_string()),
        };
        Ok(status)
    }
}

impl Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayPaymentStatus::Ready => write!(f, "READY"),
            GatewayPaymentStatus::Pending => write!(f, "PENDING"),
            GatewayPaymentStatus::Paid => write!(f, "PAID"),
            GatewayPaymentStatus::Failed => write!(f, "FAILED"),
            GatewayPaymentStatus::Cancelled => write!(f, "CANCELLED"),
            GatewayPaymentStatus::PartialCancelled => write!(f, "PARTIAL_CANCELLED"),
            GatewayPaymentStatus::VirtualAccountIssued => write!(f, "VIRTUAL_ACCOUNT_ISSUED"),
            GatewayPaymentStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or failed to answer. The caller may retry.
    #[error("The payment gateway is unavailable: {0}")]
    Unavailable(String),
    /// The gateway does not know the payment id. Retrying will not help.
    #[error("The payment gateway rejected the request: {0}")]
    Rejected(String),
}
