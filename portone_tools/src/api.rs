use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
    Url,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    config::PortOneConfig,
    data_objects::{AccessToken, CancelRequest, PortOneEnvelope, PortOnePayment, TokenRequest},
    helpers::token_reuse_window,
    PortOneApiError,
};

const DEFAULT_CANCEL_REASON: &str = "User requested";

struct CachedToken {
    token: String,
    renew_at: Instant,
}

#[derive(Clone)]
pub struct PortOneApi {
    config: PortOneConfig,
    client: Arc<Client>,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl std::fmt::Debug for PortOneApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PortOneApi ({})", self.config.api_url)
    }
}

impl PortOneApi {
    pub fn new(config: PortOneConfig) -> Result<Self, PortOneApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortOneApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), token: Arc::new(Mutex::new(None)) })
    }

    pub fn config(&self) -> &PortOneConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    /// The payment id is caller-supplied, so it is pushed as an escaped path segment rather than formatted in.
    fn payment_url(&self, gateway_payment_id: &str) -> Result<Url, PortOneApiError> {
        let mut url = Url::parse(&self.url("/payments"))
            .map_err(|e| PortOneApiError::RestRequestError(format!("Invalid PortOne url. {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PortOneApiError::RestRequestError("PortOne url cannot be a base".to_string()))?
            .push(gateway_payment_id);
        Ok(url)
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<B>,
        bearer: Option<&str>,
    ) -> Result<T, PortOneApiError> {
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| PortOneApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("💳️ REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| PortOneApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| PortOneApiError::RestResponseError(e.to_string()))?;
            Err(PortOneApiError::QueryError { status, message })
        }
    }

    fn parse_url(&self, path: &str) -> Result<Url, PortOneApiError> {
        Url::parse(&self.url(path)).map_err(|e| PortOneApiError::RestRequestError(format!("Invalid PortOne url. {e}")))
    }

    /// Returns a valid access token, requesting a new one when the cached token is missing or close to expiry.
    ///
    /// The cache lock is held across the token request so that concurrent callers share a single refresh.
    pub async fn access_token(&self) -> Result<String, PortOneApiError> {
        let mut cache = self.token.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.renew_at {
                trace!("💳️ Using cached PortOne access token");
                return Ok(cached.token.clone());
            }
        }
        debug!("💳️ Requesting new PortOne access token");
        let body = TokenRequest { imp_key: &self.config.store_id, imp_secret: self.config.secret_key.reveal() };
        let url = self.parse_url("/users/getToken")?;
        let envelope = self.rest_query::<PortOneEnvelope<AccessToken>, _>(Method::POST, url, Some(body), None).await?;
        let token = envelope.into_result()?;
        let renew_at = Instant::now() + token_reuse_window(token.expires_in);
        *cache = Some(CachedToken { token: token.access_token.clone(), renew_at });
        info!("💳️ Obtained PortOne access token, valid for {}s", token.expires_in);
        Ok(token.access_token)
    }

    /// Forget the cached token, e.g. after PortOne rejected it.
    pub async fn clear_token(&self) {
        *self.token.lock().await = None;
    }

    pub async fn get_payment(&self, gateway_payment_id: &str) -> Result<PortOnePayment, PortOneApiError> {
        let token = self.access_token().await?;
        let url = self.payment_url(gateway_payment_id)?;
        debug!("💳️ Fetching payment {gateway_payment_id}");
        let result = self.rest_query::<PortOnePayment, ()>(Method::GET, url, None, Some(&token)).await;
        if let Err(PortOneApiError::QueryError { status: 401, .. }) = &result {
            warn!("💳️ PortOne rejected the access token. It will be renewed on the next request");
            self.clear_token().await;
        }
        let payment = result?;
        info!("💳️ Fetched payment {gateway_payment_id}. Status: {}", payment.status);
        Ok(payment)
    }

    pub async fn cancel_payment(
        &self,
        gateway_payment_id: &str,
        reason: Option<&str>,
    ) -> Result<PortOnePayment, PortOneApiError> {
        let token = self.access_token().await?;
        let url = self.parse_url("/payments/cancel")?;
        let body = CancelRequest { imp_uid: gateway_payment_id, reason: reason.unwrap_or(DEFAULT_CANCEL_REASON) };
        debug!("💳️ Cancelling payment {gateway_payment_id}");
        let payment = self.rest_query::<PortOnePayment, _>(Method::POST, url, Some(body), Some(&token)).await?;
        info!("💳️ Cancelled payment {gateway_payment_id}");
        Ok(payment)
    }
}
