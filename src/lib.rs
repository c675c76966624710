//! bankcore - In-Memory Multi-Currency Banking Core
//!
//! Serializes per-account money movements under concurrent load behind a
//! single transaction gateway with a strict per-user admission limit.
//! Balances live in volatile memory; durability is out of scope.
//!
//! # Modules
//!
//! - [`api`] - validated public surface ([`Bank`])
//! - [`gateway`] - admission, locking, dispatch, completion (the core)
//! - [`store`] - user table and transaction log
//! - [`money`] - fixed-point codec at the API boundary
//! - [`config`] - operational settings
//! - [`logging`] - tracing setup
//! - [`core_types`] - shared ids and aliases
//! - [`error`] - the closed error taxonomy

pub mod api;
pub mod config;
pub mod core_types;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod money;
pub mod store;

// Convenient re-exports at crate root
pub use api::Bank;
pub use config::{AppConfig, GatewayConfig};
pub use core_types::{Currency, TxId, Username, WorkerId};
pub use error::BankError;
pub use store::transactions::{TransactionLog, TransactionRecord, TxKind, TxStatus};
pub use store::users::UserStore;
