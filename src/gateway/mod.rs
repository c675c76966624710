//! Transaction Gateway
//!
//! The core coordinator: admission control, per-user serialization,
//! two-account locking for transfers, worker dispatch and completion
//! reconciliation.

mod channel;
mod coordinator;
mod slot;
mod types;
mod worker;

#[cfg(test)]
mod integration_tests;

pub use channel::{CompletionReceiver, CompletionSender, GatewayHandle};
pub use coordinator::Gateway;
pub use slot::{SlotStatus, UserSlot};
pub use types::{Request, Settled, Waiter, WorkerFailure, WorkerOutcome, WorkerResult};
pub use worker::TransactionWorker;
