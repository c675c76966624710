//! Transaction log
//!
//! Keyed store: transaction id -> record of the balance-mutation legs a
//! worker performed. The log is independent of the user store; divergence
//! between the two after a crash is tolerated (balances are volatile
//! anyway).

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core_types::{Currency, TxId, Username, WorkerId};

/// Transaction log errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Transaction id already exists")]
    DuplicateTransaction,
}

/// Transaction kind, one per money-moving public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Deposit,
    Withdraw,
    Send,
}

impl TxKind {
    /// Get human-readable kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "DEPOSIT",
            TxKind::Withdraw => "WITHDRAW",
            TxKind::Send => "SEND",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of one balance-mutation leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpDirection {
    Credit,
    Debit,
}

impl OpDirection {
    /// Signed minor-unit delta this direction applies.
    pub fn signed(&self, amount: i64) -> i64 {
        match self {
            OpDirection::Credit => amount,
            OpDirection::Debit => -amount,
        }
    }
}

/// Leg status. A finished leg may later be reverted by compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    Finished,
    Reverted,
}

/// One balance-mutation leg of a transaction.
///
/// Appended to its transaction only after the balance write succeeded;
/// `post_balance` is the balance the write left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub direction: OpDirection,
    pub username: Username,
    pub currency: Currency,
    pub amount: i64,
    pub post_balance: i64,
    pub status: OpStatus,
}

/// Transaction states.
///
/// Terminal states: Finished, Failed, FailedReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Balance mutations underway
    InProgress,
    /// Terminal: all legs applied
    Finished,
    /// Terminal: no legs survived
    Failed(String),
    /// Terminal: finished legs were compensated (any leg the compensation
    /// itself lost is a surviving balance discrepancy)
    FailedReverted(String),
}

impl TxStatus {
    /// Check if this is a terminal state (no more transitions possible)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::InProgress)
    }
}

/// Transaction record kept by the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction id (also the log key)
    pub id: TxId,
    /// Transaction kind
    pub kind: TxKind,
    /// Applied legs, in application order
    pub operations: Vec<Operation>,
    /// Current status
    pub status: TxStatus,
    /// Worker that executed this transaction
    pub worker: WorkerId,
    /// Created timestamp (millis)
    pub created_at: i64,
    /// Last updated timestamp (millis)
    pub updated_at: i64,
}

impl TransactionRecord {
    /// Create a new record in the in-progress state.
    pub fn new(id: TxId, kind: TxKind, worker: WorkerId) -> Self {
        let now = Utc::now().timestamp_millis();

        Self {
            id,
            kind,
            operations: Vec::new(),
            status: TxStatus::InProgress,
            worker,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field patch for [`TransactionLog::update`].
///
/// Only kind, operations, status and worker are patchable; every other
/// field is owned by the log.
#[derive(Debug, Default, Clone)]
pub struct TxPatch {
    pub kind: Option<TxKind>,
    pub operations: Option<Vec<Operation>>,
    pub status: Option<TxStatus>,
    pub worker: Option<WorkerId>,
}

impl TxPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: TxKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = Some(operations);
        self
    }

    pub fn status(mut self, status: TxStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }
}

/// Thread-safe transaction log.
#[derive(Debug, Default)]
pub struct TransactionLog {
    txs: DashMap<TxId, TransactionRecord>,
}

impl TransactionLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self {
            txs: DashMap::new(),
        }
    }

    /// Insert a new record. Fails if the id is already present.
    pub fn create(&self, record: TransactionRecord) -> Result<(), LogError> {
        match self.txs.entry(record.id) {
            Entry::Occupied(_) => Err(LogError::DuplicateTransaction),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &TxId) -> Option<TransactionRecord> {
        self.txs.get(id).map(|record| record.clone())
    }

    /// Apply a field patch. Returns false when the id is unknown.
    pub fn update(&self, id: &TxId, patch: TxPatch) -> bool {
        match self.txs.get_mut(id) {
            Some(mut record) => {
                if let Some(kind) = patch.kind {
                    record.kind = kind;
                }
                if let Some(operations) = patch.operations {
                    record.operations = operations;
                }
                if let Some(status) = patch.status {
                    record.status = status;
                }
                if let Some(worker) = patch.worker {
                    record.worker = worker;
                }
                record.updated_at = Utc::now().timestamp_millis();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every record, in no particular order.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.txs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of recorded transactions.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
