use std::{fmt::Debug, future::Future};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewPaymentRecord, OrderId, PaymentRecord, PaymentStatus, Transaction, VerifiedPayment},
    events::{EventProducers, PaymentRejectedEvent, PaymentVerifiedEvent},
    helpers::order_id_from_merchant_reference,
    payment_api::{
        errors::VerificationError,
        verification_objects::{VerificationOptions, VerificationOutcome},
    },
    traits::{
        CommitOutcome,
        ExpectedAmount,
        GatewayError,
        GatewayPayment,
        OrderContext,
        PaymentGateway,
        PaymentStoreError,
        SettlementDatabase,
        UpsertResult,
    },
};

/// `VerificationApi` reconciles client-reported payments with the payment gateway's authoritative record, and
/// records the result exactly once.
///
/// `verify` is safe to call any number of times, from any number of tasks, for the same order and gateway payment id.
/// The unique constraints of the backend serialise concurrent callers; no locks are held while the gateway is queried.
pub struct VerificationApi<B, G, O> {
    db: B,
    gateway: G,
    orders: O,
    producers: EventProducers,
    options: VerificationOptions,
}

impl<B, G, O> Debug for VerificationApi<B, G, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerificationApi ({:?})", self.options)
    }
}

impl<B: Clone, G: Clone, O: Clone> Clone for VerificationApi<B, G, O> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            orders: self.orders.clone(),
            producers: self.producers.clone(),
            options: self.options.clone(),
        }
    }
}

impl<B, G, O> VerificationApi<B, G, O> {
    pub fn new(db: B, gateway: G, orders: O, producers: EventProducers) -> Self {
        Self { db, gateway, orders, producers, options: VerificationOptions::default() }
    }

    pub fn with_options(mut self, options: VerificationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &VerificationOptions {
        &self.options
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B, G, O> VerificationApi<B, G, O>
where
    B: SettlementDatabase,
    G: PaymentGateway,
    O: OrderContext,
{
    /// Verifies the payment `gateway_payment_id` that the client claims to have made for `order_id`.
    ///
    /// The work runs on its own task. If the caller stops polling the returned future, the verification still runs
    /// to a terminal decision, and the next call for the order picks up the stored result.
    pub async fn verify(
        &self,
        order_id: &OrderId,
        gateway_payment_id: &str,
    ) -> Result<VerificationOutcome, VerificationError> {
        let gateway_payment_id = gateway_payment_id.trim();
        if gateway_payment_id.is_empty() {
            return Err(VerificationError::ValidationError("A gateway payment id is required".into()));
        }
        if order_id.as_str().trim().is_empty() {
            return Err(VerificationError::ValidationError("An order id is required".into()));
        }
        let api = self.clone();
        let order_id = order_id.clone();
        let gateway_payment_id = gateway_payment_id.to_string();
        let job = tokio::spawn(async move { api.verify_to_completion(order_id, gateway_payment_id).await });
        job.await.map_err(|e| VerificationError::TaskFailed(e.to_string()))?
    }

    async fn verify_to_completion(
        &self,
        order_id: OrderId,
        gateway_payment_id: String,
    ) -> Result<VerificationOutcome, VerificationError> {
        trace!("🔄️💳️ Verifying payment {gateway_payment_id} for order {order_id}");
        if let Some(record) = self.db.fetch_payment_record(&order_id).await? {
            if record.status.is_terminal() {
                debug!(
                    "🔄️💳️ Payment for order {order_id} has already settled as {}. Returning the stored outcome",
                    record.status
                );
                return Ok(VerificationOutcome::from(record));
            }
        }
        if let Some(transaction) = self.db.fetch_transaction_by_gateway_payment_id(&gateway_payment_id).await? {
            info!(
                "🔄️💳️ Gateway payment {gateway_payment_id} was already recorded as ledger entry #{}. Duplicate delivery \
                 ignored",
                transaction.transaction_id
            );
            return self.outcome_for_recorded(&order_id, transaction).await;
        }

        let expected = self.orders.expected_amount(&order_id).await?;
        let payment = self.fetch_from_gateway(&gateway_payment_id).await?;
        if payment.gateway_payment_id != gateway_payment_id {
            warn!(
                "🔄️💳️ Gateway answered a query for {gateway_payment_id} with payment {}. The queried id will be used",
                payment.gateway_payment_id
            );
        }

        if !expected.matches(payment.amount, &payment.currency) {
            error!(
                "🔄️💳️ AMOUNT MISMATCH for order {order_id}. Expected {} {}, but gateway payment {gateway_payment_id} \
                 reports {} {}. The payment will not be credited.",
                expected.amount, expected.currency, payment.amount, payment.currency
            );
            return self.reject(&order_id, PaymentStatus::AmountMismatch, &expected, payment).await;
        }
        if !payment.status.is_paid() {
            info!(
                "🔄️💳️ Gateway payment {gateway_payment_id} for order {order_id} has status {}. The attempt has failed",
                payment.status
            );
            return self.reject(&order_id, PaymentStatus::Failed, &expected, payment).await;
        }

        let verified = VerifiedPayment::new(order_id.clone(), gateway_payment_id.clone(), payment.amount, expected.currency)
            .with_payment_method(payment.method)
            .with_paid_at(payment.paid_at)
            .with_verified_at(Utc::now());
        let commit = retry_on_conflict(|| self.db.commit_verified_payment(verified.clone())).await?;
        match commit {
            CommitOutcome::Committed { record, transaction } => {
                info!(
                    "🔄️💳️ Payment {gateway_payment_id} of {} {} for order {order_id} verified and recorded as ledger \
                     entry #{}",
                    record.amount, record.currency, transaction.transaction_id
                );
                let outcome = VerificationOutcome::from(&record);
                self.call_payment_verified_hook(record, transaction).await;
                Ok(outcome)
            },
            CommitOutcome::AlreadyRecorded(transaction) => {
                debug!("🔄️💳️ Lost the race to record {gateway_payment_id}. Returning the winner's outcome");
                self.outcome_for_recorded(&order_id, transaction).await
            },
            CommitOutcome::AlreadySettled(record) => Ok(VerificationOutcome::from(record)),
        }
    }

    /// Runs the gateway query under the configured timeout. No state has been touched at this point, so a failure
    /// here is always safe to retry.
    async fn fetch_from_gateway(&self, gateway_payment_id: &str) -> Result<GatewayPayment, VerificationError> {
        let timeout = self.options.gateway_timeout;
        match tokio::time::timeout(timeout, self.gateway.fetch_payment_status(gateway_payment_id)).await {
            Ok(Ok(payment)) => Ok(payment),
            Ok(Err(GatewayError::Unavailable(e))) => {
                warn!("🔄️💳️ Gateway unavailable while fetching {gateway_payment_id}: {e}");
                Err(VerificationError::GatewayUnavailable(e))
            },
            Ok(Err(GatewayError::Rejected(e))) => {
                warn!("🔄️💳️ Gateway rejected payment id {gateway_payment_id}: {e}");
                Err(VerificationError::GatewayRejected(e))
            },
            Err(_) => {
                warn!("🔄️💳️ Gateway did not answer for {gateway_payment_id} within {}ms", timeout.as_millis());
                Err(VerificationError::GatewayUnavailable(format!("timed out after {}ms", timeout.as_millis())))
            },
        }
    }

    async fn reject(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
        expected: &ExpectedAmount,
        payment: GatewayPayment,
    ) -> Result<VerificationOutcome, VerificationError> {
        let result = retry_on_conflict(|| {
            self.db.settle_unverified(order_id, status, expected.amount, expected.currency.as_str())
        })
        .await?;
        let outcome = VerificationOutcome::from(result.record());
        if let UpsertResult::Updated(record) = result {
            self.call_payment_rejected_hook(record, payment).await;
        }
        Ok(outcome)
    }

    /// The outcome for a gateway payment that is already in the ledger.
    async fn outcome_for_recorded(
        &self,
        order_id: &OrderId,
        transaction: Transaction,
    ) -> Result<VerificationOutcome, VerificationError> {
        if transaction.related_entity_id != order_id.as_str() {
            error!(
                "🔄️💳️ Gateway payment {:?} was presented for order {order_id}, but it already paid for order {}",
                transaction.gateway_payment_id, transaction.related_entity_id
            );
            return Err(VerificationError::PaymentAppliedToOtherOrder {
                gateway_payment_id: transaction.gateway_payment_id.unwrap_or_default(),
                order_id: transaction.related_entity_id,
            });
        }
        let record = self.db.fetch_payment_record(order_id).await?.ok_or_else(|| {
            error!("🔄️💳️ Ledger entry #{} exists, but there is no payment record for {order_id}", transaction.transaction_id);
            VerificationError::DatabaseError(format!("Payment record for {order_id} is missing"))
        })?;
        Ok(VerificationOutcome::from(record))
    }

    /// Prepares a new payment attempt for an order, with a fresh merchant reference. An attempt that settled without
    /// being verified is re-armed. Orders that have already been paid are refused.
    pub async fn prepare_payment(&self, record: NewPaymentRecord) -> Result<PaymentRecord, VerificationError> {
        if !record.amount.is_positive() {
            return Err(VerificationError::ValidationError(format!("Payment amount must be positive: {}", record.amount)));
        }
        if record.amount < self.options.min_payment_amount {
            return Err(VerificationError::ValidationError(format!(
                "Payment amount {} is below the minimum of {}",
                record.amount, self.options.min_payment_amount
            )));
        }
        if record.currency.trim().is_empty() {
            return Err(VerificationError::ValidationError("A currency is required".into()));
        }
        let order_id = record.order_id.clone();
        let result = self.db.prepare_record(record).await?;
        info!(
            "🔄️📝️ Payment attempt {} of {} {} prepared for order {order_id}",
            result.merchant_reference, result.amount, result.currency
        );
        Ok(result)
    }

    /// Verifies a payment using the merchant reference that was handed to the payment widget. The reference must name
    /// the order's current payment attempt.
    pub async fn verify_by_merchant_reference(
        &self,
        merchant_reference: &str,
        gateway_payment_id: &str,
    ) -> Result<VerificationOutcome, VerificationError> {
        let order_id = order_id_from_merchant_reference(merchant_reference).ok_or_else(|| {
            VerificationError::ValidationError(format!("{merchant_reference} is not a valid merchant reference"))
        })?;
        let record = self.db.fetch_payment_record_by_merchant_reference(merchant_reference.trim()).await?.ok_or_else(
            || {
                VerificationError::ValidationError(format!(
                    "{merchant_reference} is not the current payment attempt for order {order_id}"
                ))
            },
        )?;
        if record.order_id != order_id {
            return Err(VerificationError::ValidationError(format!(
                "{merchant_reference} belongs to order {}, not {order_id}",
                record.order_id
            )));
        }
        self.verify(&order_id, gateway_payment_id).await
    }

    /// Abandons a pending payment attempt. Verified payments cannot be cancelled here; they need a refund.
    pub async fn cancel_payment(
        &self,
        order_id: &OrderId,
        reason: Option<&str>,
    ) -> Result<VerificationOutcome, VerificationError> {
        let record = retry_on_conflict(|| self.db.cancel_record(order_id)).await?;
        info!("🔄️❌️ Payment attempt for order {order_id} cancelled. Reason: {}", reason.unwrap_or("none given"));
        Ok(VerificationOutcome::from(record))
    }

    /// The current payment outcome for an order.
    pub async fn payment_status(&self, order_id: &OrderId) -> Result<VerificationOutcome, VerificationError> {
        let record =
            self.db.fetch_payment_record(order_id).await?.ok_or_else(|| VerificationError::OrderNotFound(order_id.clone()))?;
        Ok(VerificationOutcome::from(record))
    }

    /// The ledger entries for an order, in creation order.
    pub async fn ledger_for(&self, order_id: &OrderId) -> Result<Vec<Transaction>, VerificationError> {
        let entries = self.db.fetch_transactions_for_entity(order_id.as_str()).await?;
        Ok(entries)
    }

    async fn call_payment_verified_hook(&self, record: PaymentRecord, transaction: Transaction) {
        for emitter in &self.producers.payment_verified_producer {
            debug!("🔄️📬️ Notifying payment verified hook subscribers");
            let event = PaymentVerifiedEvent::new(record.clone(), transaction.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_payment_rejected_hook(&self, record: PaymentRecord, payment: GatewayPayment) {
        for emitter in &self.producers.payment_rejected_producer {
            debug!("🔄️📬️ Notifying payment rejected hook subscribers");
            let event = PaymentRejectedEvent::new(record.clone(), payment.clone());
            emitter.publish_event(event).await;
        }
    }
}

/// Runs a store write, retrying it once if a concurrent writer held the lock. A second conflict is surfaced as
/// [`VerificationError::StorageConflict`].
async fn retry_on_conflict<T, F, Fut>(op: F) -> Result<T, VerificationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, PaymentStoreError>>,
{
    match op().await {
        Err(e) if e.is_write_conflict() => {
            warn!("🔄️🗃️ Write conflict: {e}. Retrying once");
            op().await.map_err(VerificationError::from)
        },
        result => result.map_err(VerificationError::from),
    }
}
