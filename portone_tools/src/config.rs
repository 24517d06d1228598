use std::time::Duration;

use cab_common::Secret;
use log::*;

pub const DEFAULT_PORTONE_API_URL: &str = "https://api.portone.io";
pub const DEFAULT_PORTONE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct PortOneConfig {
    pub api_url: String,
    pub store_id: String,
    pub secret_key: Secret<String>,
    /// Upper bound on a single HTTP round trip to PortOne.
    pub timeout: Duration,
}

impl Default for PortOneConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_PORTONE_API_URL.to_string(),
            store_id: String::default(),
            secret_key: Secret::default(),
            timeout: Duration::from_millis(DEFAULT_PORTONE_TIMEOUT_MS),
        }
    }
}

impl PortOneConfig {
    pub fn new<S: Into<String>>(api_url: S, store_id: S, secret_key: S) -> Self {
        Self {
            api_url: api_url.into(),
            store_id: store_id.into(),
            secret_key: Secret::new(secret_key.into()),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("CAB_PORTONE_API_URL").unwrap_or_else(|_| {
            info!("🪛️ CAB_PORTONE_API_URL not set, using {DEFAULT_PORTONE_API_URL}");
            DEFAULT_PORTONE_API_URL.to_string()
        });
        let store_id = std::env::var("CAB_PORTONE_STORE_ID").unwrap_or_else(|_| {
            warn!("🪛️ CAB_PORTONE_STORE_ID not set. Requests to PortOne will not be authorised");
            String::default()
        });
        let secret_key = Secret::new(std::env::var("CAB_PORTONE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ CAB_PORTONE_SECRET_KEY not set. Requests to PortOne will not be authorised");
            String::default()
        }));
        let timeout = std::env::var("CAB_GATEWAY_TIMEOUT_MS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid value for CAB_GATEWAY_TIMEOUT_MS ({s}). {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_PORTONE_TIMEOUT_MS);
        Self { api_url, store_id, secret_key, timeout: Duration::from_millis(timeout) }
    }
}
