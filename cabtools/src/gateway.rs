//! Bridges the PortOne REST client to the payment engine's gateway contract.
use std::str::FromStr;

use cab_common::{MinorUnits, DEFAULT_CURRENCY_CODE};
use cab_payment_engine::traits::{BuyerInfo, GatewayError, GatewayPayment, GatewayPaymentStatus, PaymentGateway};
use log::*;
use portone_tools::{PortOneApi, PortOneApiError, PortOnePayment};

#[derive(Debug, Clone)]
pub struct PortOneGateway {
    api: PortOneApi,
}

impl PortOneGateway {
    pub fn new(api: PortOneApi) -> Self {
        Self { api }
    }
}

impl PaymentGateway for PortOneGateway {
    async fn fetch_payment_status(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let payment = self.api.get_payment(gateway_payment_id).await.map_err(to_gateway_error)?;
        Ok(to_gateway_payment(payment))
    }
}

/// Only a positive "no such payment" from PortOne is a rejection. Our own credentials being refused, rate limits,
/// garbled responses and transport failures are all worth retrying.
pub fn to_gateway_error(err: PortOneApiError) -> GatewayError {
    if err.is_unknown_payment() {
        return GatewayError::Rejected(err.to_string());
    }
    if !err.is_transient() {
        warn!("💳️ PortOne request failed in a way that will not clear up by itself. Check the configuration. {err}");
    }
    GatewayError::Unavailable(err.to_string())
}

pub fn to_gateway_payment(payment: PortOnePayment) -> GatewayPayment {
    let status = GatewayPaymentStatus::from_str(&payment.status).unwrap_or_else(|never| match never {});
    let paid_at = payment.paid_at().unwrap_or_else(|e| {
        warn!("💳️ Ignoring the paidAt field of payment {}. {e}", payment.id);
        None
    });
    let method = payment.method_type().map(str::to_string);
    let buyer = payment
        .customer
        .map(|c| BuyerInfo { name: c.name, email: c.email, phone: c.phone_number })
        .unwrap_or_default();
    let currency = payment.currency.unwrap_or_else(|| DEFAULT_CURRENCY_CODE.to_string());
    let mut result =
        GatewayPayment::new(payment.id, status, MinorUnits::from(payment.amount.total)).with_currency(currency).with_buyer(buyer);
    result.method = method;
    result.paid_at = paid_at;
    result
}
