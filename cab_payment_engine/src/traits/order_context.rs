use std::future::Future;

use cab_common::MinorUnits;
use thiserror::Error;

use crate::db_types::OrderId;

/// Supplies the amount an order expects to be paid. The gateway's figures are checked against this, never against
/// anything the client reports.
pub trait OrderContext: Clone + Send + Sync + 'static {
    fn expected_amount(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<ExpectedAmount, OrderContextError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedAmount {
    pub amount: MinorUnits,
    pub currency: String,
}

impl ExpectedAmount {
    pub fn new<S: Into<String>>(amount: MinorUnits, currency: S) -> Self {
        Self { amount, currency: currency.into() }
    }

    /// Exact match on the amount. Currency codes are compared case-insensitively.
    pub fn matches(&self, amount: MinorUnits, currency: &str) -> bool {
        self.amount == amount && self.currency.trim().eq_ignore_ascii_case(currency.trim())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderContextError {
    #[error("Order {0} does not exist or is not eligible for payment")]
    OrderNotFound(OrderId),
    #[error("Could not fetch the order context: {0}")]
    Unavailable(String),
}
