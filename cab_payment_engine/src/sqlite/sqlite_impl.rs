//! `SqliteDatabase` is a concrete implementation of a CatchABite payment engine backend.
//!
//! It uses SQLite as the backend and implements all the storage traits defined in the [`crate::traits`] module. It
//! also acts as the [`OrderContext`] for deployments where checkout writes the `Pending` payment record, since the
//! amount on that record was fixed when the order was placed.
use std::fmt::Debug;

use cab_common::MinorUnits;
use log::*;
use sqlx::SqlitePool;

use super::{
    db::{db_url, new_pool, payment_records, transactions},
    SqliteDatabaseError,
};
use crate::{
    db_types::{NewPaymentRecord, NewTransaction, OrderId, PaymentRecord, PaymentStatus, Transaction, VerifiedPayment},
    traits::{
        CommitOutcome,
        ExpectedAmount,
        LedgerError,
        OrderContext,
        OrderContextError,
        PaymentRecordStore,
        PaymentStoreError,
        SettlementDatabase,
        TransactionLedger,
        UpsertResult,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl TransactionLedger for SqliteDatabase {
    async fn record_transaction(&self, transaction: NewTransaction) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = transactions::insert_transaction(transaction, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Ledger entry #{} ({}) recorded for {}",
            result.transaction_id, result.transaction_type, result.related_entity_id
        );
        Ok(result)
    }

    async fn fetch_transactions_for_entity(&self, related_entity_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transactions_for_entity(related_entity_id, &mut conn).await
    }

    async fn fetch_transaction_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction_by_gateway_payment_id(gateway_payment_id, &mut conn).await
    }

    async fn fetch_transaction(&self, transaction_id: i64) -> Result<Option<Transaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(transaction_id, &mut conn).await
    }
}

impl PaymentRecordStore for SqliteDatabase {
    async fn fetch_payment_record(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payment_records::fetch_payment_record(order_id, &mut conn).await
    }

    async fn fetch_payment_record_by_merchant_reference(
        &self,
        merchant_reference: &str,
    ) -> Result<Option<PaymentRecord>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payment_records::fetch_payment_record_by_merchant_reference(merchant_reference, &mut conn).await
    }

    async fn upsert_verified(&self, payment: VerifiedPayment) -> Result<UpsertResult, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = match payment_records::verify_record(&payment, &mut tx).await? {
            Some(record) => UpsertResult::Updated(record),
            None => {
                let record = payment_records::fetch_payment_record(&payment.order_id, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentStoreError::RecordNotFound(payment.order_id.clone()))?;
                debug!("🗃️ Payment for order {} had already settled as {}. Nothing to do", payment.order_id, record.status);
                UpsertResult::Unchanged(record)
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn settle_unverified(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
        amount: MinorUnits,
        currency: &str,
    ) -> Result<UpsertResult, PaymentStoreError> {
        if !matches!(status, PaymentStatus::AmountMismatch | PaymentStatus::Failed) {
            return Err(PaymentStoreError::InvalidSettlementStatus(status));
        }
        let mut tx = self.pool.begin().await?;
        let result = match payment_records::settle_record(order_id, status, amount, currency, &mut tx).await? {
            Some(record) => {
                debug!("🗃️ Payment for order {order_id} settled as {status}");
                UpsertResult::Updated(record)
            },
            None => {
                let record = payment_records::fetch_payment_record(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentStoreError::RecordNotFound(order_id.clone()))?;
                debug!("🗃️ Payment for order {order_id} had already settled as {}. Nothing to do", record.status);
                UpsertResult::Unchanged(record)
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn prepare_record(&self, record: NewPaymentRecord) -> Result<PaymentRecord, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let order_id = record.order_id.clone();
        let result = match payment_records::prepare_record(record, &mut tx).await? {
            Some(record) => record,
            None => {
                tx.rollback().await?;
                return Err(PaymentStoreError::AlreadyVerified(order_id));
            },
        };
        tx.commit().await?;
        debug!("🗃️ Payment attempt {} prepared for order {}", result.merchant_reference, result.order_id);
        Ok(result)
    }

    async fn cancel_record(&self, order_id: &OrderId) -> Result<PaymentRecord, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = match payment_records::cancel_record(order_id, &mut tx).await? {
            Some(record) => Ok(record),
            None => match payment_records::fetch_payment_record(order_id, &mut tx).await? {
                None => Err(PaymentStoreError::RecordNotFound(order_id.clone())),
                Some(record) => Err(PaymentStoreError::IllegalStatusTransition {
                    order_id: order_id.clone(),
                    from: record.status,
                    to: PaymentStatus::Cancelled,
                }),
            },
        };
        match result {
            Ok(record) => {
                tx.commit().await?;
                debug!("🗃️ Payment for order {order_id} cancelled");
                Ok(record)
            },
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            },
        }
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The ledger insert goes first so that the transaction takes the SQLite write lock before it reads anything.
    /// A concurrent committer for the same gateway payment id waits on the lock and then fails the unique constraint.
    async fn commit_verified_payment(&self, payment: VerifiedPayment) -> Result<CommitOutcome, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let transaction = match transactions::insert_transaction(NewTransaction::payment(&payment), &mut tx).await {
            Ok(t) => t,
            Err(LedgerError::DuplicateTransaction(id)) => {
                tx.rollback().await?;
                debug!("🗃️ Gateway payment {id} is already in the ledger. Nothing was written");
                let mut conn = self.pool.acquire().await?;
                let existing = transactions::fetch_transaction_by_gateway_payment_id(&id, &mut conn)
                    .await?
                    .ok_or_else(|| {
                        PaymentStoreError::DatabaseError(format!("Ledger entry for {id} disappeared after a conflict"))
                    })?;
                return Ok(CommitOutcome::AlreadyRecorded(existing));
            },
            Err(e) => return Err(e.into()),
        };
        match payment_records::verify_record(&payment, &mut tx).await? {
            Some(record) => {
                tx.commit().await?;
                debug!(
                    "🗃️ Payment {} for order {} committed as ledger entry #{}",
                    payment.gateway_payment_id, payment.order_id, transaction.transaction_id
                );
                Ok(CommitOutcome::Committed { record, transaction })
            },
            None => {
                tx.rollback().await?;
                let mut conn = self.pool.acquire().await?;
                let record = payment_records::fetch_payment_record(&payment.order_id, &mut conn)
                    .await?
                    .ok_or_else(|| PaymentStoreError::RecordNotFound(payment.order_id.clone()))?;
                warn!(
                    "🗃️ Order {} had already settled as {} (gateway payment {:?}), but gateway payment {} reports as \
                     paid. Nothing was written. The payment needs to be refunded manually.",
                    payment.order_id, record.status, record.gateway_payment_id, payment.gateway_payment_id
                );
                Ok(CommitOutcome::AlreadySettled(record))
            },
        }
    }

    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderContext for SqliteDatabase {
    async fn expected_amount(&self, order_id: &OrderId) -> Result<ExpectedAmount, OrderContextError> {
        let record = self
            .fetch_payment_record(order_id)
            .await
            .map_err(|e| OrderContextError::Unavailable(e.to_string()))?
            .ok_or_else(|| OrderContextError::OrderNotFound(order_id.clone()))?;
        Ok(ExpectedAmount::new(record.amount, record.currency))
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `CAB_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
