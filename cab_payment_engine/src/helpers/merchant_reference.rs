//! Merchant references are the local idempotency keys handed to the payment widget before the gateway has assigned a
//! payment id. They have the form
//!
//! ```text
//!    ORDER_{order_id}_{unix_millis}
//! ```
//!
//! A new reference is generated for every payment attempt, so a failed or mismatched attempt never collides with the
//! next one.
use chrono::Utc;

use crate::db_types::OrderId;

pub const MERCHANT_REFERENCE_PREFIX: &str = "ORDER_";

pub fn new_merchant_reference(order_id: &OrderId) -> String {
    format!("{MERCHANT_REFERENCE_PREFIX}{}_{}", order_id.as_str(), Utc::now().timestamp_millis())
}

/// Extracts the order id from a merchant reference. Order ids may themselves contain underscores, so only the final
/// `_{millis}` segment is stripped.
pub fn order_id_from_merchant_reference(reference: &str) -> Option<OrderId> {
    let pattern = regex::Regex::new(r"^ORDER_(.+)_(\d+)$").ok()?;
    pattern.captures(reference.trim()).and_then(|c| c.get(1).map(|m| m.as_str().to_string().into()))
}
