use chrono::{DateTime, Utc};

use crate::PortOneApiError;

/// PortOne reports `paidAt` either as an RFC 3339 timestamp or as seconds since the Unix epoch.
pub fn parse_paid_at(value: &str) -> Result<DateTime<Utc>, PortOneApiError> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| PortOneApiError::InvalidTimestamp(format!("{value} is out of range")));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PortOneApiError::InvalidTimestamp(format!("{value}. {e}")))
}

/// How long a freshly issued token should be used for. Tokens are renewed once 95% of their lifetime has passed.
pub fn token_reuse_window(expires_in_secs: u64) -> std::time::Duration {
    std::time::Duration::from_millis(expires_in_secs.saturating_mul(950))
}
