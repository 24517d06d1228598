use std::time::Duration;

use cab_common::MinorUnits;
use cab_payment_engine::{
    db_types::{NewPaymentRecord, NewTransaction, OrderId, PaymentStatus, TransactionType, VerifiedPayment},
    events::EventProducers,
    test_utils::{
        fakes::{FixedOrderContext, ScriptedGateway},
        prepare_env::prepare_test_db,
    },
    traits::{CommitOutcome, GatewayPayment, GatewayPaymentStatus, LedgerError, PaymentStoreError, UpsertResult},
    PaymentRecordStore,
    SettlementDatabase,
    SqliteDatabase,
    TransactionLedger,
    VerificationApi,
    VerificationError,
    VerificationOptions,
    VerificationStatus,
};
use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

type TestApi = VerificationApi<SqliteDatabase, ScriptedGateway, FixedOrderContext>;

struct TestSystem {
    api: TestApi,
    gateway: ScriptedGateway,
    orders: FixedOrderContext,
}

async fn setup() -> TestSystem {
    let db = prepare_test_db().await;
    let gateway = ScriptedGateway::new();
    let orders = FixedOrderContext::new();
    let api = VerificationApi::new(db, gateway.clone(), orders.clone(), EventProducers::default());
    TestSystem { api, gateway, orders }
}

async fn tear_down<G, O>(mut api: VerificationApi<SqliteDatabase, G, O>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to remove database {url}: {e}");
    }
}

fn oid(id: &str) -> OrderId {
    OrderId::from(id)
}

#[tokio::test]
async fn paid_and_matching_payment_is_verified_exactly_once() {
    let sys = setup().await;
    sys.orders.add_order("O1", 15_000, "KRW");
    sys.gateway.paid("G1", 15_000);

    let outcome = sys.api.verify(&oid("O1"), "G1").await.expect("verification failed");
    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(outcome.gateway_payment_id.as_deref(), Some("G1"));
    assert_eq!(outcome.amount, MinorUnits::from(15_000));
    assert_eq!(outcome.currency, "KRW");
    assert!(outcome.verified_at.is_some());

    let ledger = sys.api.ledger_for(&oid("O1")).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].transaction_type, TransactionType::Payment);
    assert_eq!(ledger[0].gateway_payment_id.as_deref(), Some("G1"));
    assert_eq!(ledger[0].amount, MinorUnits::from(15_000));
    assert_eq!(ledger[0].related_entity_type, "ORDER");

    // Replays return the identical outcome without asking the gateway again
    let replay = sys.api.verify(&oid("O1"), "G1").await.expect("replay failed");
    assert_eq!(replay, outcome);
    assert_eq!(sys.gateway.call_count(), 1);
    assert_eq!(sys.api.ledger_for(&oid("O1")).await.unwrap().len(), 1);
    tear_down(sys.api).await;
}

#[tokio::test]
async fn amount_mismatch_is_never_credited() {
    let sys = setup().await;
    sys.orders.add_order("O2", 15_000, "KRW");
    sys.gateway.paid("G2", 12_000);
    let attempt = sys.api.prepare_payment(NewPaymentRecord::new(oid("O2"), MinorUnits::from(15_000))).await.unwrap();

    let outcome = sys.api.verify(&oid("O2"), "G2").await.expect("verification failed");
    assert_eq!(outcome.status, VerificationStatus::AmountMismatch);
    assert_eq!(outcome.amount, MinorUnits::from(15_000));
    assert!(outcome.verified_at.is_none());

    let record = sys.api.db().fetch_payment_record(&oid("O2")).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::AmountMismatch);
    assert_eq!(record.merchant_reference, attempt.merchant_reference);
    assert!(record.gateway_payment_id.is_none());
    assert!(sys.api.ledger_for(&oid("O2")).await.unwrap().is_empty());
    assert!(sys.api.db().fetch_transaction_by_gateway_payment_id("G2").await.unwrap().is_none());

    // The attempt is terminal. Retrying does not reach the gateway.
    let replay = sys.api.verify(&oid("O2"), "G2").await.unwrap();
    assert_eq!(replay, outcome);
    assert_eq!(sys.gateway.call_count(), 1);
    tear_down(sys.api).await;
}

#[tokio::test]
async fn currency_mismatch_is_an_amount_mismatch() {
    let sys = setup().await;
    sys.orders.add_order("O21", 15_000, "KRW");
    let payment =
        GatewayPayment::new("G21", GatewayPaymentStatus::Paid, MinorUnits::from(15_000)).with_currency("USD");
    sys.gateway.respond("G21", Ok(payment));
    let outcome = sys.api.verify(&oid("O21"), "G21").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::AmountMismatch);
    assert!(sys.api.ledger_for(&oid("O21")).await.unwrap().is_empty());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn gateway_timeout_leaves_the_record_pending() {
    let sys = setup().await;
    let options = VerificationOptions::default().with_gateway_timeout(Duration::from_millis(100));
    let api = sys.api.with_options(options);
    sys.orders.add_order("O4", 15_000, "KRW");
    sys.gateway.paid("G4", 15_000).set_delay(Duration::from_millis(500));
    api.prepare_payment(NewPaymentRecord::new(oid("O4"), MinorUnits::from(15_000))).await.unwrap();

    let err = api.verify(&oid("O4"), "G4").await.expect_err("the gateway should have timed out");
    assert!(matches!(err, VerificationError::GatewayUnavailable(_)), "unexpected error: {err}");
    assert!(err.is_retryable());
    let flat = err.retryable_outcome(&oid("O4"), "G4").unwrap();
    assert_eq!(flat.status, VerificationStatus::RetryableError);

    let record = api.db().fetch_payment_record(&oid("O4")).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Pending);
    assert!(api.ledger_for(&oid("O4")).await.unwrap().is_empty());

    // Once the gateway recovers, the same call goes through
    sys.gateway.set_delay(Duration::ZERO);
    let outcome = api.verify(&oid("O4"), "G4").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(api.ledger_for(&oid("O4")).await.unwrap().len(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn unavailable_gateway_is_retryable() {
    let sys = setup().await;
    sys.orders.add_order("O41", 15_000, "KRW");
    sys.gateway.unavailable("G41");
    let err = sys.api.verify(&oid("O41"), "G41").await.unwrap_err();
    assert!(matches!(err, VerificationError::GatewayUnavailable(_)));
    assert!(sys.api.db().fetch_payment_record(&oid("O41")).await.unwrap().is_none());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn unpaid_payments_fail_the_attempt() {
    let sys = setup().await;
    sys.orders.add_order("O5", 15_000, "KRW");
    sys.gateway.with_status("G5", GatewayPaymentStatus::Failed, 15_000);
    sys.api.prepare_payment(NewPaymentRecord::new(oid("O5"), MinorUnits::from(15_000))).await.unwrap();

    let outcome = sys.api.verify(&oid("O5"), "G5").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert!(sys.api.ledger_for(&oid("O5")).await.unwrap().is_empty());
    let status = sys.api.payment_status(&oid("O5")).await.unwrap();
    assert_eq!(status, outcome);
    tear_down(sys.api).await;
}

#[tokio::test]
async fn unknown_payment_ids_are_rejected_without_changes() {
    let sys = setup().await;
    sys.orders.add_order("O6", 15_000, "KRW");
    sys.api.prepare_payment(NewPaymentRecord::new(oid("O6"), MinorUnits::from(15_000))).await.unwrap();

    let err = sys.api.verify(&oid("O6"), "G-unknown").await.unwrap_err();
    assert!(matches!(err, VerificationError::GatewayRejected(_)));
    assert!(!err.is_retryable());
    let record = sys.api.db().fetch_payment_record(&oid("O6")).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Pending);
    tear_down(sys.api).await;
}

#[tokio::test]
async fn a_payment_cannot_pay_for_two_orders() {
    let sys = setup().await;
    sys.orders.add_order("O7a", 15_000, "KRW");
    sys.orders.add_order("O7b", 15_000, "KRW");
    sys.gateway.paid("G7", 15_000);
    sys.api.verify(&oid("O7a"), "G7").await.unwrap();

    let err = sys.api.verify(&oid("O7b"), "G7").await.unwrap_err();
    match err {
        VerificationError::PaymentAppliedToOtherOrder { gateway_payment_id, order_id } => {
            assert_eq!(gateway_payment_id, "G7");
            assert_eq!(order_id, "O7a");
        },
        e => panic!("unexpected error: {e}"),
    }
    assert!(sys.api.db().fetch_payment_record(&oid("O7b")).await.unwrap().is_none());
    assert_eq!(sys.gateway.call_count(), 1);
    tear_down(sys.api).await;
}

#[tokio::test]
async fn verified_orders_keep_their_first_payment() {
    let sys = setup().await;
    sys.orders.add_order("O8", 15_000, "KRW");
    sys.gateway.paid("G8a", 15_000).paid("G8b", 15_000);
    let first = sys.api.verify(&oid("O8"), "G8a").await.unwrap();
    let second = sys.api.verify(&oid("O8"), "G8b").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(second.gateway_payment_id.as_deref(), Some("G8a"));
    assert!(sys.api.db().fetch_transaction_by_gateway_payment_id("G8b").await.unwrap().is_none());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn verify_by_merchant_reference_with_the_database_as_order_context() {
    let db = prepare_test_db().await;
    let gateway = ScriptedGateway::new();
    let api = VerificationApi::new(db.clone(), gateway.clone(), db, EventProducers::default());
    gateway.paid("G9", 15_000);

    let attempt = api.prepare_payment(NewPaymentRecord::new(oid("O9"), MinorUnits::from(15_000))).await.unwrap();
    assert_eq!(attempt.status, PaymentStatus::Pending);
    assert_eq!(attempt.payment_method, "card");
    assert!(attempt.merchant_reference.starts_with("ORDER_O9_"));

    let err = api.verify_by_merchant_reference("ORDER_O9_1", "G9").await.unwrap_err();
    assert!(matches!(err, VerificationError::ValidationError(_)));
    let err = api.verify_by_merchant_reference("not-a-reference", "G9").await.unwrap_err();
    assert!(matches!(err, VerificationError::ValidationError(_)));

    let outcome = api.verify_by_merchant_reference(&attempt.merchant_reference, "G9").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(outcome.order_id, oid("O9"));

    let err = api.prepare_payment(NewPaymentRecord::new(oid("O9"), MinorUnits::from(15_000))).await.unwrap_err();
    assert!(matches!(err, VerificationError::AlreadyVerified(_)));

    // Orders that checkout never prepared are unknown to this order context
    let err = api.verify(&oid("O9x"), "G9").await.unwrap_err();
    assert!(matches!(err, VerificationError::PaymentAppliedToOtherOrder { .. }));
    let err = api.verify(&oid("O9x"), "G9x").await.unwrap_err();
    assert!(matches!(err, VerificationError::OrderNotFound(_)));
    tear_down(api).await;
}

#[tokio::test]
async fn prepare_payment_validates_amounts() {
    let sys = setup().await;
    let err = sys.api.prepare_payment(NewPaymentRecord::new(oid("O91"), MinorUnits::from(0))).await.unwrap_err();
    assert!(matches!(err, VerificationError::ValidationError(_)));
    let err = sys.api.prepare_payment(NewPaymentRecord::new(oid("O91"), MinorUnits::from(99))).await.unwrap_err();
    assert!(matches!(err, VerificationError::ValidationError(_)));
    let ok = sys.api.prepare_payment(NewPaymentRecord::new(oid("O91"), MinorUnits::from(100))).await.unwrap();
    assert_eq!(ok.amount, MinorUnits::from(100));
    tear_down(sys.api).await;
}

#[tokio::test]
async fn a_new_attempt_rearms_a_mismatched_record() {
    let sys = setup().await;
    sys.orders.add_order("O10", 15_000, "KRW");
    sys.gateway.paid("G10a", 12_000).paid("G10b", 15_000);
    let first = sys.api.prepare_payment(NewPaymentRecord::new(oid("O10"), MinorUnits::from(15_000))).await.unwrap();
    let outcome = sys.api.verify(&oid("O10"), "G10a").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::AmountMismatch);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = sys.api.prepare_payment(NewPaymentRecord::new(oid("O10"), MinorUnits::from(15_000))).await.unwrap();
    assert_eq!(second.status, PaymentStatus::Pending);
    assert_ne!(second.merchant_reference, first.merchant_reference);
    assert_eq!(second.id, first.id);

    let err = sys.api.verify_by_merchant_reference(&first.merchant_reference, "G10b").await.unwrap_err();
    assert!(matches!(err, VerificationError::ValidationError(_)));
    let outcome = sys.api.verify_by_merchant_reference(&second.merchant_reference, "G10b").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(outcome.gateway_payment_id.as_deref(), Some("G10b"));
    tear_down(sys.api).await;
}

#[tokio::test]
async fn only_pending_attempts_can_be_cancelled() {
    let sys = setup().await;
    sys.orders.add_order("O11", 15_000, "KRW").add_order("O12", 15_000, "KRW");
    sys.gateway.paid("G11", 15_000).paid("G12", 15_000);
    sys.api.prepare_payment(NewPaymentRecord::new(oid("O11"), MinorUnits::from(15_000))).await.unwrap();

    let cancelled = sys.api.cancel_payment(&oid("O11"), Some("customer closed the widget")).await.unwrap();
    assert_eq!(cancelled.status, VerificationStatus::Cancelled);
    let outcome = sys.api.verify(&oid("O11"), "G11").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Cancelled);
    assert_eq!(sys.gateway.call_count(), 0);

    sys.api.verify(&oid("O12"), "G12").await.unwrap();
    let err = sys.api.cancel_payment(&oid("O12"), None).await.unwrap_err();
    assert!(matches!(err, VerificationError::IllegalStatusTransition(_)));
    let err = sys.api.cancel_payment(&oid("O13"), None).await.unwrap_err();
    assert!(matches!(err, VerificationError::OrderNotFound(_)));
    tear_down(sys.api).await;
}

#[tokio::test]
async fn ledger_accepts_other_entry_types_and_rejects_duplicates() {
    let sys = setup().await;
    let db = sys.api.db();
    let payout = NewTransaction::new(TransactionType::StorePayout, "store-77", MinorUnits::from(13_500))
        .with_related_entity_type("STORE");
    let first = db.record_transaction(payout.clone()).await.unwrap();
    let second = db.record_transaction(payout).await.unwrap();
    assert!(second.transaction_id > first.transaction_id);

    let custom = NewTransaction::new(TransactionType::Other("PromoCredit".into()), "store-77", MinorUnits::from(500))
        .with_gateway_payment_id("promo-1");
    let promo = db.record_transaction(custom.clone()).await.unwrap();
    assert_eq!(promo.transaction_type, TransactionType::Other("PromoCredit".into()));
    let err = db.record_transaction(custom).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTransaction(ref id) if id == "promo-1"));

    let entries = db.fetch_transactions_for_entity("store-77").await.unwrap();
    let ids = entries.iter().map(|t| t.transaction_id).collect::<Vec<_>>();
    assert_eq!(ids, vec![first.transaction_id, second.transaction_id, promo.transaction_id]);
    assert_eq!(db.fetch_transaction(first.transaction_id).await.unwrap(), Some(first));
    assert!(db.fetch_transaction(9_999).await.unwrap().is_none());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn upsert_verified_is_a_no_op_once_verified() {
    let sys = setup().await;
    let db = sys.api.db();
    let payment = VerifiedPayment::new(oid("O14"), "G14", MinorUnits::from(15_000), "KRW");
    let first = db.upsert_verified(payment.clone()).await.unwrap();
    assert!(first.is_updated());
    assert_eq!(first.record().status, PaymentStatus::Verified);

    let other = VerifiedPayment::new(oid("O14"), "G14b", MinorUnits::from(20_000), "KRW");
    let second = db.upsert_verified(other).await.unwrap();
    assert_eq!(second, UpsertResult::Unchanged(first.record().clone()));

    let err = db.prepare_record(NewPaymentRecord::new(oid("O14"), MinorUnits::from(15_000))).await.unwrap_err();
    assert!(matches!(err, PaymentStoreError::AlreadyVerified(_)));
    let err = db
        .settle_unverified(&oid("O14"), PaymentStatus::Verified, MinorUnits::from(15_000), "KRW")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentStoreError::InvalidSettlementStatus(_)));
    let unchanged = db.settle_unverified(&oid("O14"), PaymentStatus::Failed, MinorUnits::from(15_000), "KRW").await;
    assert!(!unchanged.unwrap().is_updated());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn stored_history_cannot_be_rewritten() {
    let sys = setup().await;
    sys.orders.add_order("O15", 15_000, "KRW");
    sys.gateway.paid("G15", 15_000);
    sys.api.verify(&oid("O15"), "G15").await.unwrap();
    let pool = sys.api.db().pool();

    let res = sqlx::query("UPDATE payment_records SET status = 'Pending' WHERE order_id = 'O15'").execute(pool).await;
    assert!(res.is_err(), "verified payment records must be final");
    let res = sqlx::query("UPDATE transactions SET amount = 1 WHERE gateway_payment_id = 'G15'").execute(pool).await;
    assert!(res.is_err(), "ledger entries must be immutable");
    let res = sqlx::query("DELETE FROM transactions").execute(pool).await;
    assert!(res.is_err(), "ledger entries must be permanent");
    tear_down(sys.api).await;
}

#[tokio::test]
async fn writes_are_visible_to_every_pooled_connection() {
    let sys = setup().await;
    let db = sys.api.db().clone();
    for i in 0..5 {
        let order_id = format!("O16-{i}");
        sys.orders.add_order(&order_id, 15_000, "KRW");
        sys.gateway.paid(&format!("G16-{i}"), 15_000);
        let first = NewPaymentRecord::new(oid(&order_id), MinorUnits::from(15_000))
            .with_merchant_reference(format!("ORDER_{order_id}_1000"));
        let first = sys.api.prepare_payment(first).await.unwrap();
        let second = NewPaymentRecord::new(oid(&order_id), MinorUnits::from(15_000))
            .with_merchant_reference(format!("ORDER_{order_id}_2000"));
        let second = sys.api.prepare_payment(second).await.unwrap();

        let reads = join_all((0..8).map(|_| {
            let db = db.clone();
            let reference = first.merchant_reference.clone();
            async move { db.fetch_payment_record_by_merchant_reference(&reference).await.unwrap() }
        }))
        .await;
        assert!(reads.iter().all(Option::is_none), "round {i}: a superseded reference was still found");

        let outcome = sys.api.verify_by_merchant_reference(&second.merchant_reference, &format!("G16-{i}")).await;
        assert_eq!(outcome.unwrap().status, VerificationStatus::Verified);
    }

    let payout = NewTransaction::new(TransactionType::StorePayout, "store-16", MinorUnits::from(5_000))
        .with_gateway_payment_id("payout-16");
    let entry = db.record_transaction(payout).await.unwrap();
    let reads = join_all((0..8).map(|_| {
        let db = db.clone();
        async move { db.fetch_transaction_by_gateway_payment_id("payout-16").await.unwrap() }
    }))
    .await;
    assert!(reads.iter().all(|t| t.as_ref() == Some(&entry)), "a reader missed the new ledger entry");
    tear_down(sys.api).await;
}

#[tokio::test]
async fn a_late_commit_leaves_a_settled_record_alone() {
    let sys = setup().await;
    let db = sys.api.db();
    db.prepare_record(NewPaymentRecord::new(oid("O17"), MinorUnits::from(15_000))).await.unwrap();
    db.settle_unverified(&oid("O17"), PaymentStatus::AmountMismatch, MinorUnits::from(15_000), "KRW").await.unwrap();

    let late = VerifiedPayment::new(oid("O17"), "G17", MinorUnits::from(15_000), "KRW");
    match db.commit_verified_payment(late.clone()).await.unwrap() {
        CommitOutcome::AlreadySettled(record) => {
            assert_eq!(record.status, PaymentStatus::AmountMismatch);
            assert!(record.gateway_payment_id.is_none());
        },
        other => panic!("unexpected commit outcome: {other:?}"),
    }
    assert!(db.fetch_transaction_by_gateway_payment_id("G17").await.unwrap().is_none());
    let unchanged = db.upsert_verified(late).await.unwrap();
    assert!(!unchanged.is_updated());
    assert_eq!(unchanged.record().status, PaymentStatus::AmountMismatch);

    db.prepare_record(NewPaymentRecord::new(oid("O17c"), MinorUnits::from(15_000))).await.unwrap();
    db.cancel_record(&oid("O17c")).await.unwrap();
    let late = VerifiedPayment::new(oid("O17c"), "G17c", MinorUnits::from(15_000), "KRW");
    let outcome = db.commit_verified_payment(late).await.unwrap();
    assert!(matches!(outcome, CommitOutcome::AlreadySettled(ref r) if r.status == PaymentStatus::Cancelled));
    assert!(db.fetch_transaction_by_gateway_payment_id("G17c").await.unwrap().is_none());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn a_verification_in_flight_cannot_overturn_a_mismatch() {
    let sys = setup().await;
    sys.orders.add_order("O18", 15_000, "KRW");
    sys.gateway.paid("G18good", 15_000).paid("G18bad", 12_000);
    sys.api.prepare_payment(NewPaymentRecord::new(oid("O18"), MinorUnits::from(15_000))).await.unwrap();

    // The slow caller is parked inside the gateway call while the fast one settles the attempt
    sys.gateway.set_delay(Duration::from_millis(200));
    let api = sys.api.clone();
    let slow = tokio::spawn(async move { api.verify(&oid("O18"), "G18good").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    sys.gateway.set_delay(Duration::ZERO);
    let fast = sys.api.verify(&oid("O18"), "G18bad").await.unwrap();
    assert_eq!(fast.status, VerificationStatus::AmountMismatch);

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.status, VerificationStatus::AmountMismatch);
    assert_eq!(sys.gateway.call_count(), 2);
    let record = sys.api.db().fetch_payment_record(&oid("O18")).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::AmountMismatch);
    assert!(sys.api.ledger_for(&oid("O18")).await.unwrap().is_empty());
    assert!(sys.api.db().fetch_transaction_by_gateway_payment_id("G18good").await.unwrap().is_none());
    tear_down(sys.api).await;
}

#[tokio::test]
async fn abandoned_verification_still_completes() {
    let sys = setup().await;
    sys.orders.add_order("O19", 15_000, "KRW");
    sys.gateway.paid("G19", 15_000).set_delay(Duration::from_millis(200));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), sys.api.verify(&oid("O19"), "G19")).await;
    assert!(abandoned.is_err(), "the caller should have given up before the gateway answered");
    tokio::time::sleep(Duration::from_millis(400)).await;

    let record = sys.api.db().fetch_payment_record(&oid("O19")).await.unwrap().expect("no record was written");
    assert_eq!(record.status, PaymentStatus::Verified);
    assert_eq!(record.gateway_payment_id.as_deref(), Some("G19"));
    assert_eq!(sys.api.ledger_for(&oid("O19")).await.unwrap().len(), 1);
    assert_eq!(sys.gateway.call_count(), 1);

    let replay = sys.api.verify(&oid("O19"), "G19").await.unwrap();
    assert_eq!(replay.status, VerificationStatus::Verified);
    assert_eq!(sys.gateway.call_count(), 1);
    tear_down(sys.api).await;
}

#[tokio::test]
async fn gateway_method_and_paid_time_are_recorded() {
    let sys = setup().await;
    sys.orders.add_order("O20", 15_000, "KRW").add_order("O20k", 15_000, "KRW");
    let paid_at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 12, 44).unwrap();
    let payment = GatewayPayment::new("G20", GatewayPaymentStatus::Paid, MinorUnits::from(15_000))
        .with_method("vbank")
        .with_paid_at(paid_at);
    sys.gateway.respond("G20", Ok(payment));
    let attempt = sys.api.prepare_payment(NewPaymentRecord::new(oid("O20"), MinorUnits::from(15_000))).await.unwrap();
    assert_eq!(attempt.payment_method, "card");
    assert!(attempt.paid_at.is_none());

    let outcome = sys.api.verify(&oid("O20"), "G20").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Verified);
    let record = sys.api.db().fetch_payment_record(&oid("O20")).await.unwrap().unwrap();
    assert_eq!(record.payment_method, "vbank");
    assert_eq!(record.paid_at, Some(paid_at));

    // Without a reported method the one chosen at checkout stays
    sys.gateway.with_status("G20k", GatewayPaymentStatus::Paid, 15_000);
    let attempt = NewPaymentRecord::new(oid("O20k"), MinorUnits::from(15_000)).with_payment_method("kakaopay");
    sys.api.prepare_payment(attempt).await.unwrap();
    sys.api.verify(&oid("O20k"), "G20k").await.unwrap();
    let record = sys.api.db().fetch_payment_record(&oid("O20k")).await.unwrap().unwrap();
    assert_eq!(record.payment_method, "kakaopay");
    assert!(record.paid_at.is_none());
    tear_down(sys.api).await;
}
