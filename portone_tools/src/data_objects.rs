use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{helpers::parse_paid_at, PortOneApiError};

/// The `{ code, message, response }` wrapper PortOne puts around its authentication responses.
#[derive(Debug, Clone, Deserialize)]
pub struct PortOneEnvelope<T> {
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    pub response: Option<T>,
}

impl<T> PortOneEnvelope<T> {
    pub fn into_result(self) -> Result<T, PortOneApiError> {
        if self.code != 0 {
            let message = self.message.unwrap_or_else(|| format!("PortOne returned code {}", self.code));
            return Err(PortOneApiError::TokenError(message));
        }
        self.response.ok_or_else(|| PortOneApiError::JsonError("Response body is missing".to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub imp_key: &'a str,
    pub imp_secret: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the token, in seconds
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CancelRequest<'a> {
    pub imp_uid: &'a str,
    pub reason: &'a str,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortOnePayment {
    pub id: String,
    pub status: String,
    pub amount: PaymentAmount,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default, rename = "paidAt")]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub customer: Option<PortOneCustomer>,
    #[serde(default)]
    pub cancellation: Option<PaymentCancellation>,
}

impl PortOnePayment {
    pub fn paid_at(&self) -> Result<Option<DateTime<Utc>>, PortOneApiError> {
        self.paid_at.as_deref().map(parse_paid_at).transpose()
    }

    pub fn method_type(&self) -> Option<&str> {
        self.method.as_ref().and_then(|m| m.method_type.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentAmount {
    pub total: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentMethod {
    #[serde(default, rename = "type")]
    pub method_type: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PortOneCustomer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentCancellation {
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserialize_payment() {
        let json = r#"{
            "id": "imp_448280090638",
            "status": "PAID",
            "amount": { "total": 15000 },
            "currency": "KRW",
            "method": { "type": "card", "provider": "KCP" },
            "paidAt": "2024-06-01T09:12:44Z",
            "customer": { "name": "Kim Minji", "email": "minji@example.com", "phoneNumber": "010-1234-5678" }
        }"#;
        let payment: PortOnePayment = serde_json::from_str(json).unwrap();
        assert_eq!(payment.id, "imp_448280090638");
        assert_eq!(payment.amount.total, 15000);
        assert_eq!(payment.method_type(), Some("card"));
        assert_eq!(payment.paid_at().unwrap().unwrap().to_rfc3339(), "2024-06-01T09:12:44+00:00");
        assert_eq!(payment.customer.unwrap().phone_number.as_deref(), Some("010-1234-5678"));
        assert!(payment.cancellation.is_none());
    }

    #[test]
    fn minimal_payment() {
        let json = r#"{ "id": "imp_1", "status": "READY", "amount": { "total": 0 } }"#;
        let payment: PortOnePayment = serde_json::from_str(json).unwrap();
        assert!(payment.currency.is_none());
        assert!(payment.paid_at().unwrap().is_none());
    }

    #[test]
    fn token_envelope() {
        let json = r#"{ "code": 0, "message": null, "response": { "access_token": "abc", "expires_in": 1800 } }"#;
        let env: PortOneEnvelope<AccessToken> = serde_json::from_str(json).unwrap();
        let token = env.into_result().unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 1800);

        let json = r#"{ "code": -1, "message": "Unauthorized", "response": null }"#;
        let env: PortOneEnvelope<AccessToken> = serde_json::from_str(json).unwrap();
        assert!(matches!(env.into_result(), Err(PortOneApiError::TokenError(m)) if m == "Unauthorized"));
    }
}
