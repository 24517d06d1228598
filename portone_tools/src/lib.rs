mod api;
mod config;
mod data_objects;
mod error;

pub mod helpers;

pub use api::PortOneApi;
pub use config::{PortOneConfig, DEFAULT_PORTONE_API_URL, DEFAULT_PORTONE_TIMEOUT_MS};
pub use data_objects::{
    AccessToken,
    PaymentAmount,
    PaymentCancellation,
    PaymentMethod,
    PortOneCustomer,
    PortOneEnvelope,
    PortOnePayment,
};
pub use error::PortOneApiError;
