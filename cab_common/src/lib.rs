mod helpers;
mod minor_units;

pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use minor_units::{MinorUnits, DEFAULT_CURRENCY_CODE, KRW_CURRENCY_CODE};
pub use secret::Secret;
