//! Queries on the `payment_records` table.
//!
//! Every write is a single statement that checks the current status as part of the write (`WHERE status ...`), so
//! two racing writers can never both transition the same record. A statement that loses the race returns no row.
use cab_common::MinorUnits;
use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{NewPaymentRecord, OrderId, PaymentRecord, PaymentStatus, VerifiedPayment, DEFAULT_PAYMENT_METHOD},
    helpers::new_merchant_reference,
    traits::PaymentStoreError,
};

impl FromRow<'_, SqliteRow> for PaymentRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status = row
            .try_get::<String, _>("status")?
            .parse::<PaymentStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            merchant_reference: row.try_get("merchant_reference")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            payment_method: row.try_get("payment_method")?,
            status,
            verified_at: row.try_get("verified_at")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub async fn fetch_payment_record(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentStoreError> {
    let record: Option<PaymentRecord> = sqlx::query_as("SELECT * FROM payment_records WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

pub async fn fetch_payment_record_by_merchant_reference(
    merchant_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentStoreError> {
    let record: Option<PaymentRecord> =
        sqlx::query_as("SELECT * FROM payment_records WHERE merchant_reference = $1")
            .bind(merchant_reference)
            .fetch_optional(conn)
            .await?;
    Ok(record)
}

/// Moves the order's `Pending` record to `Verified`, creating it if it does not exist. The gateway's payment method
/// replaces the one chosen at prepare time when the gateway reports one.
///
/// Returns `None` if the record had already left `Pending`, in which case nothing was changed.
pub async fn verify_record(
    payment: &VerifiedPayment,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentStoreError> {
    let merchant_reference = new_merchant_reference(&payment.order_id);
    let record: Option<PaymentRecord> = sqlx::query_as(
        r#"
            INSERT INTO payment_records (
                order_id,
                merchant_reference,
                gateway_payment_id,
                amount,
                currency,
                payment_method,
                status,
                verified_at,
                paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'Verified', $7, $8)
            ON CONFLICT(order_id) DO UPDATE SET
                gateway_payment_id = excluded.gateway_payment_id,
                amount = excluded.amount,
                currency = excluded.currency,
                payment_method = COALESCE($9, payment_records.payment_method),
                status = 'Verified',
                verified_at = excluded.verified_at,
                paid_at = excluded.paid_at,
                updated_at = CURRENT_TIMESTAMP
            WHERE payment_records.status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(payment.order_id.as_str())
    .bind(merchant_reference)
    .bind(payment.gateway_payment_id.as_str())
    .bind(payment.amount)
    .bind(payment.currency.as_str())
    .bind(payment.payment_method.as_deref().unwrap_or(DEFAULT_PAYMENT_METHOD))
    .bind(payment.verified_at)
    .bind(payment.paid_at)
    .bind(payment.payment_method.as_deref())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Verify record for order {}: changed = {}", payment.order_id, record.is_some());
    Ok(record)
}

/// Settles a `Pending` (or absent) record with the given non-verified terminal status.
///
/// Returns `None` if the record had already left `Pending`.
pub async fn settle_record(
    order_id: &OrderId,
    status: PaymentStatus,
    amount: MinorUnits,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentStoreError> {
    let merchant_reference = new_merchant_reference(order_id);
    let record: Option<PaymentRecord> = sqlx::query_as(
        r#"
            INSERT INTO payment_records (order_id, merchant_reference, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(order_id) DO UPDATE SET
                status = excluded.status,
                updated_at = CURRENT_TIMESTAMP
            WHERE payment_records.status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(merchant_reference)
    .bind(amount)
    .bind(currency)
    .bind(status.to_string())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Settle record for order {order_id} as {status}: changed = {}", record.is_some());
    Ok(record)
}

/// Creates a `Pending` record for a new payment attempt, or re-arms an unverified one with the new merchant reference.
///
/// Returns `None` if the order has already been verified.
pub async fn prepare_record(
    record: NewPaymentRecord,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentStoreError> {
    let merchant_reference = record.merchant_reference.clone();
    let result: Option<PaymentRecord> = sqlx::query_as(
        r#"
            INSERT INTO payment_records (order_id, merchant_reference, amount, currency, payment_method, status)
            VALUES ($1, $2, $3, $4, $5, 'Pending')
            ON CONFLICT(order_id) DO UPDATE SET
                merchant_reference = excluded.merchant_reference,
                gateway_payment_id = NULL,
                amount = excluded.amount,
                currency = excluded.currency,
                payment_method = excluded.payment_method,
                status = 'Pending',
                verified_at = NULL,
                paid_at = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE payment_records.status <> 'Verified'
            RETURNING *;
        "#,
    )
    .bind(record.order_id.as_str())
    .bind(record.merchant_reference)
    .bind(record.amount)
    .bind(record.currency)
    .bind(record.payment_method)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            PaymentStoreError::DuplicateMerchantReference(merchant_reference)
        },
        _ => PaymentStoreError::from(e),
    })?;
    Ok(result)
}

/// Moves a `Pending` record to `Cancelled`. Returns `None` if there is no pending record for the order.
pub async fn cancel_record(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentStoreError> {
    let record: Option<PaymentRecord> = sqlx::query_as(
        r#"
            UPDATE payment_records SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(record)
}
