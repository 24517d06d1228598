use std::time::Duration;

use cab_common::MinorUnits;
use cab_payment_engine::{
    db_types::{NewPaymentRecord, OrderId, PaymentStatus},
    traits::{GatewayPayment, GatewayPaymentStatus},
    PaymentRecordStore,
    TransactionLedger,
    VerificationOptions,
};
use cucumber::{given, then, when};
use futures_util::future::join_all;

use crate::cucumber::PaymentWorld;

#[given(expr = "order {word} expects {int} {word}")]
async fn order_expects(world: &mut PaymentWorld, order_id: String, amount: i64, currency: String) {
    world.system().orders.add_order(&order_id, amount, &currency);
}

#[given(expr = "a pending payment attempt for order {word} of {int} KRW")]
async fn pending_attempt(world: &mut PaymentWorld, order_id: String, amount: i64) {
    let record = NewPaymentRecord::new(OrderId::from(order_id), MinorUnits::from(amount));
    world.api().prepare_payment(record).await.expect("Error preparing payment");
}

#[given(expr = "the gateway reports payment {word} as {word} with {int} {word}")]
async fn gateway_reports(world: &mut PaymentWorld, payment_id: String, status: String, amount: i64, currency: String) {
    let status = status.parse::<GatewayPaymentStatus>().expect("Infallible");
    let payment = GatewayPayment::new(payment_id.as_str(), status, MinorUnits::from(amount)).with_currency(currency);
    world.system().gateway.respond(&payment_id, Ok(payment));
}

#[given(expr = "the gateway takes {int}ms to answer")]
async fn gateway_delay(world: &mut PaymentWorld, ms: u64) {
    world.system().gateway.set_delay(Duration::from_millis(ms));
}

#[given(expr = "the gateway timeout is {int}ms")]
async fn gateway_timeout(world: &mut PaymentWorld, ms: u64) {
    let system = world.system.as_mut().expect("Payment system not initialised");
    let options = VerificationOptions::default().with_gateway_timeout(Duration::from_millis(ms));
    system.api = system.api.clone().with_options(options);
}

#[when(expr = "I verify payment {word} for order {word}")]
async fn verify_payment(world: &mut PaymentWorld, payment_id: String, order_id: String) {
    let result = world.api().verify(&OrderId::from(order_id.as_str()), &payment_id).await;
    world.outcomes.entry(order_id).or_default().push(result);
}

#[when(expr = "{int} callers verify payment {word} for order {word} at the same time")]
async fn verify_concurrently(world: &mut PaymentWorld, callers: usize, payment_id: String, order_id: String) {
    let calls = (0..callers).map(|_| {
        let api = world.api().clone();
        let order_id = OrderId::from(order_id.as_str());
        let payment_id = payment_id.clone();
        tokio::spawn(async move { api.verify(&order_id, &payment_id).await })
    });
    let results = join_all(calls).await.into_iter().map(|r| r.expect("Verification task panicked"));
    world.outcomes.entry(order_id).or_default().extend(results);
}

#[then(expr = "the outcome for order {word} is {word}")]
async fn check_outcome(world: &mut PaymentWorld, order_id: String, expected: String) {
    let status = match world.last_outcome(&order_id) {
        Ok(outcome) => outcome.status.to_string(),
        Err(e) => e
            .retryable_outcome(&OrderId::from(order_id.as_str()), "")
            .map(|o| o.status.to_string())
            .unwrap_or_else(|| format!("ERROR: {e}")),
    };
    assert_eq!(status, expected, "Unexpected outcome for order {order_id}");
}

#[then(expr = "all outcomes for order {word} are identical")]
async fn check_identical(world: &mut PaymentWorld, order_id: String) {
    let outcomes = world.outcomes.get(&order_id).expect("Order has not been verified");
    let outcomes = outcomes.iter().map(|r| r.as_ref().expect("Verification failed")).collect::<Vec<_>>();
    assert!(outcomes.len() > 1, "Expected more than one outcome for order {order_id}");
    assert!(outcomes.iter().all(|o| *o == outcomes[0]), "Outcomes differ: {outcomes:?}");
    assert!(outcomes[0].verified_at.is_some());
}

#[then(expr = "the ledger holds {int} entries for order {word}")]
async fn check_ledger_for_order(world: &mut PaymentWorld, count: usize, order_id: String) {
    let entries = world.api().ledger_for(&OrderId::from(order_id)).await.expect("Error fetching ledger");
    assert_eq!(entries.len(), count);
}

#[then(expr = "the ledger entry for gateway payment {word} is {int} {word}")]
async fn check_ledger_entry(world: &mut PaymentWorld, payment_id: String, amount: i64, currency: String) {
    let entry = world
        .api()
        .db()
        .fetch_transaction_by_gateway_payment_id(&payment_id)
        .await
        .expect("Error fetching ledger")
        .expect("No ledger entry for the payment");
    assert_eq!(entry.amount, MinorUnits::from(amount));
    assert_eq!(entry.currency, currency);
}

#[then(expr = "the payment record for order {word} is {word}")]
async fn check_record(world: &mut PaymentWorld, order_id: String, status: String) {
    let expected = status.parse::<PaymentStatus>().expect("Not a valid payment status");
    let record = world
        .api()
        .db()
        .fetch_payment_record(&OrderId::from(order_id))
        .await
        .expect("Error fetching payment record")
        .expect("Payment record does not exist");
    assert_eq!(record.status, expected);
}

#[then(expr = "the gateway was queried {int} time(s)")]
async fn check_gateway_calls(world: &mut PaymentWorld, count: usize) {
    assert_eq!(world.system().gateway.call_count(), count);
}
