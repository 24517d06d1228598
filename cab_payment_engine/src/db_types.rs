use std::{fmt::Display, str::FromStr};

use cab_common::{MinorUnits, DEFAULT_CURRENCY_CODE};
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::helpers::new_merchant_reference;

pub const DEFAULT_PAYMENT_METHOD: &str = "card";
pub const ORDER_ENTITY_TYPE: &str = "ORDER";

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConversionError("An order id cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// A payment attempt has been prepared, but the gateway has not confirmed it yet.
    Pending,
    /// The gateway confirmed the payment, and the amount matched the order. This status is final.
    Verified,
    /// The gateway reported a different amount or currency to what the order expects.
    AmountMismatch,
    /// The gateway reported that the payment was not completed.
    Failed,
    /// The attempt was abandoned before it was verified.
    Cancelled,
}

impl PaymentStatus {
    /// Terminal statuses are never changed by the verification flow. Only a new payment attempt (with a new merchant
    /// reference) can move a non-verified terminal record back to `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Verified => write!(f, "Verified"),
            PaymentStatus::AmountMismatch => write!(f, "AmountMismatch"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Verified" => Ok(Self::Verified),
            "AmountMismatch" => Ok(Self::AmountMismatch),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------    PaymentRecord     ---------------------------------------------------------
/// The settlement state of the payment attempt for a single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: OrderId,
    /// The locally generated idempotency key for the current payment attempt.
    pub merchant_reference: String,
    /// The gateway's identifier for the payment. Only set once the payment has been verified.
    pub gateway_payment_id: Option<String>,
    /// The amount the order expects, in minor units.
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub verified_at: Option<DateTime<Utc>>,
    /// When the gateway reports the customer paid. Only set on verified records.
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewPaymentRecord   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub order_id: OrderId,
    pub merchant_reference: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_method: String,
}

impl NewPaymentRecord {
    /// Creates a new KRW card payment attempt for the order, with a freshly generated merchant reference.
    pub fn new(order_id: OrderId, amount: MinorUnits) -> Self {
        let merchant_reference = new_merchant_reference(&order_id);
        Self {
            order_id,
            merchant_reference,
            amount,
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        }
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into().to_ascii_uppercase();
        self
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = method.into();
        self
    }

    pub fn with_merchant_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.merchant_reference = reference.into();
        self
    }
}

//--------------------------------------   VerifiedPayment    ---------------------------------------------------------
/// The facts needed to move a payment record to `Verified` and append the matching ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub order_id: OrderId,
    pub gateway_payment_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    /// The method the gateway reports the customer paid with. `None` keeps the method fixed at prepare time.
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub verified_at: DateTime<Utc>,
}

impl VerifiedPayment {
    pub fn new<S: Into<String>>(order_id: OrderId, gateway_payment_id: S, amount: MinorUnits, currency: S) -> Self {
        Self {
            order_id,
            gateway_payment_id: gateway_payment_id.into(),
            amount,
            currency: currency.into(),
            payment_method: None,
            paid_at: None,
            verified_at: Utc::now(),
        }
    }

    pub fn with_verified_at(mut self, verified_at: DateTime<Utc>) -> Self {
        self.verified_at = verified_at;
        self
    }

    pub fn with_payment_method(mut self, method: Option<String>) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_paid_at(mut self, paid_at: Option<DateTime<Utc>>) -> Self {
        self.paid_at = paid_at;
        self
    }
}

//--------------------------------------   TransactionType    ---------------------------------------------------------
/// The kind of ledger entry. The set is open: flows outside the verification engine may record their own types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// A customer payment for an order.
    Payment,
    Refund,
    SettlementAdjustment,
    /// A payout to a store owner.
    StorePayout,
    /// A payout to a delivery rider.
    DeliveryPayout,
    Other(String),
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Payment => write!(f, "Payment"),
            TransactionType::Refund => write!(f, "Refund"),
            TransactionType::SettlementAdjustment => write!(f, "SettlementAdjustment"),
            TransactionType::StorePayout => write!(f, "StorePayout"),
            TransactionType::DeliveryPayout => write!(f, "DeliveryPayout"),
            TransactionType::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for TransactionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Payment" => Self::Payment,
            "Refund" => Self::Refund,
            "SettlementAdjustment" => Self::SettlementAdjustment,
            "StorePayout" => Self::StorePayout,
            "DeliveryPayout" => Self::DeliveryPayout,
            _ => Self::Other(value),
        }
    }
}

//--------------------------------------     Transaction      ---------------------------------------------------------
/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Surrogate key. Ascending ids give the audit order of the ledger.
    pub transaction_id: i64,
    pub transaction_type: TransactionType,
    pub related_entity_id: String,
    pub related_entity_type: String,
    pub gateway_payment_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    NewTransaction    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub related_entity_id: String,
    pub related_entity_type: String,
    pub gateway_payment_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
}

impl NewTransaction {
    pub fn new<S: Into<String>>(transaction_type: TransactionType, related_entity_id: S, amount: MinorUnits) -> Self {
        Self {
            transaction_type,
            related_entity_id: related_entity_id.into(),
            related_entity_type: ORDER_ENTITY_TYPE.to_string(),
            gateway_payment_id: None,
            amount,
            currency: DEFAULT_CURRENCY_CODE.to_string(),
        }
    }

    /// The ledger entry written when a customer payment for an order is verified.
    pub fn payment(payment: &VerifiedPayment) -> Self {
        Self::new(TransactionType::Payment, payment.order_id.as_str(), payment.amount)
            .with_gateway_payment_id(payment.gateway_payment_id.clone())
            .with_currency(payment.currency.clone())
    }

    pub fn with_gateway_payment_id<S: Into<String>>(mut self, id: S) -> Self {
        self.gateway_payment_id = Some(id.into());
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_related_entity_type<S: Into<String>>(mut self, entity_type: S) -> Self {
        self.related_entity_type = entity_type.into();
        self
    }
}
