//! Scripted stand-ins for the payment gateway and the order context.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use cab_common::MinorUnits;

use crate::{
    db_types::OrderId,
    traits::{
        ExpectedAmount,
        GatewayError,
        GatewayPayment,
        GatewayPaymentStatus,
        OrderContext,
        OrderContextError,
        PaymentGateway,
    },
};

/// A gateway that answers from a script. Payment ids that are not in the script are rejected as unknown.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    responses: Arc<Mutex<HashMap<String, Result<GatewayPayment, GatewayError>>>>,
    calls: Arc<AtomicUsize>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, gateway_payment_id: &str, response: Result<GatewayPayment, GatewayError>) -> &Self {
        self.responses.lock().unwrap().insert(gateway_payment_id.to_string(), response);
        self
    }

    /// Scripts a fully paid KRW payment.
    pub fn paid(&self, gateway_payment_id: &str, amount: i64) -> &Self {
        let payment = GatewayPayment::new(gateway_payment_id, GatewayPaymentStatus::Paid, MinorUnits::from(amount))
            .with_method("card");
        self.respond(gateway_payment_id, Ok(payment))
    }

    pub fn with_status(&self, gateway_payment_id: &str, status: GatewayPaymentStatus, amount: i64) -> &Self {
        let payment = GatewayPayment::new(gateway_payment_id, status, MinorUnits::from(amount));
        self.respond(gateway_payment_id, Ok(payment))
    }

    pub fn unavailable(&self, gateway_payment_id: &str) -> &Self {
        self.respond(gateway_payment_id, Err(GatewayError::Unavailable("503 Service Unavailable".into())))
    }

    /// Every response is delayed by `delay`. Use this to simulate a slow or hanging gateway.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for ScriptedGateway {
    async fn fetch_payment_status(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.responses.lock().unwrap().get(gateway_payment_id).cloned();
        response.unwrap_or_else(|| Err(GatewayError::Rejected(format!("Unknown payment id {gateway_payment_id}"))))
    }
}

/// An order context with a fixed set of orders.
#[derive(Clone, Default)]
pub struct FixedOrderContext {
    orders: Arc<Mutex<HashMap<OrderId, ExpectedAmount>>>,
}

impl FixedOrderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_order(&self, order_id: &str, amount: i64, currency: &str) -> &Self {
        let expected = ExpectedAmount::new(MinorUnits::from(amount), currency);
        self.orders.lock().unwrap().insert(OrderId::from(order_id), expected);
        self
    }
}

impl OrderContext for FixedOrderContext {
    async fn expected_amount(&self, order_id: &OrderId) -> Result<ExpectedAmount, OrderContextError> {
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| OrderContextError::OrderNotFound(order_id.clone()))
    }
}
