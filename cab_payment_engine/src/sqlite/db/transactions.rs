use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{NewTransaction, Transaction, TransactionType},
    traits::LedgerError,
};

impl FromRow<'_, SqliteRow> for Transaction {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            transaction_id: row.try_get("transaction_id")?,
            transaction_type: TransactionType::from(row.try_get::<String, _>("transaction_type")?),
            related_entity_id: row.try_get("related_entity_id")?,
            related_entity_type: row.try_get("related_entity_type")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Appends a new entry to the ledger. This is not atomic on its own; embed it in a transaction and pass `&mut tx` if
/// it must be written together with other changes.
pub async fn insert_transaction(
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, LedgerError> {
    let gateway_payment_id = transaction.gateway_payment_id.clone().unwrap_or_default();
    let result: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                transaction_type,
                related_entity_id,
                related_entity_type,
                gateway_payment_id,
                amount,
                currency
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(transaction.transaction_type.to_string())
    .bind(transaction.related_entity_id)
    .bind(transaction.related_entity_type)
    .bind(transaction.gateway_payment_id)
    .bind(transaction.amount)
    .bind(transaction.currency)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::DuplicateTransaction(gateway_payment_id)
        },
        _ => LedgerError::from(e),
    })?;
    Ok(result)
}

pub async fn fetch_transactions_for_entity(
    related_entity_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, LedgerError> {
    let transactions: Vec<Transaction> =
        sqlx::query_as("SELECT * FROM transactions WHERE related_entity_id = $1 ORDER BY transaction_id ASC")
            .bind(related_entity_id)
            .fetch_all(conn)
            .await?;
    Ok(transactions)
}

pub async fn fetch_transaction_by_gateway_payment_id(
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction: Option<Transaction> = sqlx::query_as("SELECT * FROM transactions WHERE gateway_payment_id = $1")
        .bind(gateway_payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(transaction)
}

pub async fn fetch_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction: Option<Transaction> = sqlx::query_as("SELECT * FROM transactions WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(transaction)
}
