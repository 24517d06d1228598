//! # CatchABite payment engine public API
//!
//! The `payment_api` module exposes the programmatic API of the payment engine.
//!
//! * [`verification_api`] prepares payment attempts, reconciles them against the payment gateway, and records the
//!   outcome exactly once in the payment record store and the ledger.
//! * [`verification_objects`] holds the caller-facing result types.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend, a payment gateway and an order context:
//!
//! ```rust,ignore
//! use cab_payment_engine::{SqliteDatabase, VerificationApi, events::EventProducers};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase is both the settlement database and the order context
//! let api = VerificationApi::new(db.clone(), gateway, db, EventProducers::default());
//! let outcome = api.verify(&order_id, "imp_123456789").await?;
//! ```
pub mod errors;
pub mod verification_api;
pub mod verification_objects;
