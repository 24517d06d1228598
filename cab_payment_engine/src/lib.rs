//! CatchABite Payment Engine
//!
//! The payment engine reconciles payments that customers make through the PortOne payment widget with PortOne's
//! authoritative record of them, and records each settled payment exactly once, no matter how many times (or how
//! concurrently) the client and the gateway webhook report it.
//!
//! The library is divided into these main sections:
//! 1. Storage contracts and collaborator contracts ([`mod@traits`]). The payment record store and the transaction
//!    ledger are implemented by database backends. The payment gateway and the order context are supplied by the
//!    surrounding system.
//! 2. The SQLite backend ([`SqliteDatabase`]). You should never need to access the database directly. Use the public
//!    API instead. The data types stored in the database are defined in [`mod@db_types`] and are public.
//! 3. The payment engine public API ([`VerificationApi`]).
//!
//! The engine also emits events once a payment has been durably verified or rejected. See [`mod@events`].
pub mod db_types;
pub mod events;
pub mod helpers;
mod payment_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use payment_api::{
    errors::VerificationError,
    verification_api::VerificationApi,
    verification_objects,
    verification_objects::{VerificationOptions, VerificationOutcome, VerificationStatus},
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use traits::{
    OrderContext,
    PaymentGateway,
    PaymentRecordStore,
    SettlementDatabase,
    TransactionLedger,
};
