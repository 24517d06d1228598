use std::{fmt::Write, str::FromStr, time::Duration};

use cab_common::{parse_boolean_flag, MinorUnits};
use cab_payment_engine::verification_objects::{
    VerificationOptions,
    DEFAULT_GATEWAY_TIMEOUT_MS,
    DEFAULT_MIN_PAYMENT_AMOUNT,
};
use log::*;
use portone_tools::PortOneConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/catchabite_payments.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct CabConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub gateway_timeout: Duration,
    pub min_payment_amount: MinorUnits,
    pub event_buffer_size: usize,
    /// Bring the database schema up to date on startup
    pub auto_migrate: bool,
    pub portone: PortOneConfig,
}

impl Default for CabConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            gateway_timeout: Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS),
            min_payment_amount: MinorUnits::from(DEFAULT_MIN_PAYMENT_AMOUNT),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            auto_migrate: true,
            portone: PortOneConfig::default(),
        }
    }
}

impl CabConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = std::env::var("CAB_DATABASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ CAB_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env_or_default("CAB_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let timeout_ms = env_or_default("CAB_GATEWAY_TIMEOUT_MS", DEFAULT_GATEWAY_TIMEOUT_MS);
        let min_payment_amount = env_or_default("CAB_MIN_PAYMENT_AMOUNT", DEFAULT_MIN_PAYMENT_AMOUNT);
        let event_buffer_size = env_or_default("CAB_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let auto_migrate = parse_boolean_flag(std::env::var("CAB_AUTO_MIGRATE").ok(), true);
        Self {
            database_url,
            max_connections,
            gateway_timeout: Duration::from_millis(timeout_ms),
            min_payment_amount: MinorUnits::from(min_payment_amount),
            event_buffer_size,
            auto_migrate,
            portone: PortOneConfig::new_from_env_or_default(),
        }
    }

    pub fn verification_options(&self) -> VerificationOptions {
        VerificationOptions::default()
            .with_gateway_timeout(self.gateway_timeout)
            .with_min_payment_amount(self.min_payment_amount)
    }

    /// A printable summary of the configuration. Secrets are masked.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "CAB_DATABASE_URL        : {}", self.database_url);
        let _ = writeln!(s, "CAB_DB_MAX_CONNECTIONS  : {}", self.max_connections);
        let _ = writeln!(s, "CAB_GATEWAY_TIMEOUT_MS  : {}", self.gateway_timeout.as_millis());
        let _ = writeln!(s, "CAB_MIN_PAYMENT_AMOUNT  : {}", self.min_payment_amount);
        let _ = writeln!(s, "CAB_EVENT_BUFFER_SIZE   : {}", self.event_buffer_size);
        let _ = writeln!(s, "CAB_AUTO_MIGRATE        : {}", self.auto_migrate);
        let _ = writeln!(s, "CAB_PORTONE_API_URL     : {}", self.portone.api_url);
        let _ = writeln!(s, "CAB_PORTONE_STORE_ID    : {}", self.portone.store_id);
        let _ = writeln!(s, "CAB_PORTONE_SECRET_KEY  : {}", self.portone.secret_key);
        s
    }
}

fn env_or_default<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T
where T::Err: std::fmt::Display {
    match std::env::var(key) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid value for {key} ({s}). {e}. Using the default, {default}");
            default
        }),
        Err(_) => {
            info!("🪛️ {key} is not set. Using the default, {default}");
            default
        },
    }
}
