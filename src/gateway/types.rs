//! Gateway Core Types
//!
//! Requests as the coordinator admits them, reply payloads, and the
//! messages workers publish on the completion bus.

use tokio::sync::oneshot;

use crate::core_types::{Currency, Username, WorkerId};
use crate::error::BankError;
use crate::store::transactions::TxKind;

/// A client request. Amounts are minor units; the public API has already
/// validated and converted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Deposit {
        username: Username,
        currency: Currency,
        amount: i64,
    },
    Withdraw {
        username: Username,
        currency: Currency,
        amount: i64,
    },
    Send {
        from: Username,
        to: Username,
        currency: Currency,
        amount: i64,
    },
    Balance {
        username: Username,
        currency: Currency,
    },
}

impl Request {
    /// The account whose admission budget this request consumes.
    ///
    /// Transfers charge their sender only; receivers are never
    /// rate-limited by inbound credits.
    pub fn subject(&self) -> &str {
        match self {
            Request::Deposit { username, .. }
            | Request::Withdraw { username, .. }
            | Request::Balance { username, .. } => username,
            Request::Send { from, .. } => from,
        }
    }
}

/// Successful reply payload, minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// New (or read) balance of the single account involved.
    Balance(i64),
    /// Post-transfer balances of both endpoints.
    Transfer { from_balance: i64, to_balance: i64 },
}

/// One-shot reply channel handed to the coordinator with each request.
///
/// The coordinator writes it exactly once and drops it; delivery to a
/// caller that went away is a no-op.
pub type Waiter = oneshot::Sender<Result<Settled, BankError>>;

/// One queued client call: the request plus its reply channel.
#[derive(Debug)]
pub struct Submission {
    pub request: Request,
    pub waiter: Waiter,
}

/// Reason a worker gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerFailure {
    /// Subject balance below the requested amount
    NotEnoughFunds,
    /// A user vanished between admission and execution (defensive; users
    /// are never deleted)
    UserDoesNotExist,
    /// A balance write failed mid-transaction; finished legs were reverted
    BalanceUpdate,
}

/// Result half of a worker's terminal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Finished {
        kind: TxKind,
        sender_balance: i64,
        receiver_balance: Option<i64>,
    },
    Failed {
        reason: WorkerFailure,
    },
}

/// Terminal message published by every worker on the completion bus.
///
/// Carries the worker's own handle so the coordinator can locate the
/// waiter, and both endpoints so their queues can advance.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: WorkerId,
    pub sender: Username,
    pub receiver: Option<Username>,
    pub result: WorkerResult,
}
