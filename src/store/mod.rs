//! In-memory stores: the user table and the transaction log.
//!
//! Both are process-wide, thread-safe at the entry level and independent of
//! each other. Neither promises any cross-key ordering; serialization of
//! balance mutations is the gateway's job.

pub mod transactions;
pub mod users;
