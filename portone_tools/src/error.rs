use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortOneApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not obtain an access token: {0}")]
    TokenError(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl PortOneApiError {
    /// PortOne does not know the payment id, or refuses it as malformed. Asking again will not change the answer.
    pub fn is_unknown_payment(&self) -> bool {
        matches!(self, Self::QueryError { status: 400 | 404 | 422, .. })
    }

    /// True when the same request could succeed if it were sent again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RestResponseError(_) => true,
            Self::QueryError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
