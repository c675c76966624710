//! Transaction Worker
//!
//! One spawned task per admitted mutation. The coordinator's slot state is
//! the lock: a worker runs knowing it is the only writer for the one or two
//! users it touches. It applies the balance legs, keeps the transaction log
//! in step, compensates finished legs if a write fails mid-flight, and
//! publishes exactly one terminal outcome on the completion bus.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core_types::{Currency, TxId, Username, WorkerId};
use crate::store::transactions::{
    OpDirection, OpStatus, Operation, TransactionLog, TransactionRecord, TxKind, TxPatch, TxStatus,
};
use crate::store::users::UserStore;

use super::channel::CompletionSender;
use super::types::{Request, WorkerFailure, WorkerOutcome, WorkerResult};

pub struct TransactionWorker {
    id: WorkerId,
    users: Arc<UserStore>,
    log: Arc<TransactionLog>,
    bus: CompletionSender,
}

impl TransactionWorker {
    /// Spawn a worker for one admitted request.
    ///
    /// Returns the handle the coordinator keys its in-flight registry on.
    pub fn spawn(
        request: Request,
        users: Arc<UserStore>,
        log: Arc<TransactionLog>,
        bus: CompletionSender,
    ) -> WorkerId {
        let id = WorkerId::new();
        let worker = Self {
            id,
            users,
            log,
            bus,
        };
        tokio::spawn(worker.run(request));
        id
    }

    async fn run(self, request: Request) {
        let outcome = match request {
            Request::Deposit {
                username,
                currency,
                amount,
            } => self.run_single(TxKind::Deposit, username, currency, amount),
            Request::Withdraw {
                username,
                currency,
                amount,
            } => self.run_single(TxKind::Withdraw, username, currency, amount),
            Request::Send {
                from,
                to,
                currency,
                amount,
            } => self.run_send(from, to, currency, amount),
            Request::Balance { .. } => {
                // Balance reads never reach a worker; the coordinator
                // answers them inline.
                error!(worker = %self.id, "balance request dispatched to a worker");
                return;
            }
        };
        self.bus.publish(outcome).await;
    }

    fn run_single(
        &self,
        kind: TxKind,
        username: Username,
        currency: Currency,
        amount: i64,
    ) -> WorkerOutcome {
        let Some(user) = self.users.get(&username) else {
            warn!(worker = %self.id, user = %username, "user vanished before execution");
            return self.failed(username, None, WorkerFailure::UserDoesNotExist);
        };

        if kind == TxKind::Withdraw && user.balance(&currency) < amount {
            debug!(worker = %self.id, user = %username, currency = %currency, "not enough funds");
            return self.failed(username, None, WorkerFailure::NotEnoughFunds);
        }

        let Some(tx_id) = self.open_transaction(kind) else {
            return self.failed(username, None, WorkerFailure::BalanceUpdate);
        };

        let direction = match kind {
            TxKind::Deposit => OpDirection::Credit,
            _ => OpDirection::Debit,
        };

        let mut ops = Vec::new();
        match self.apply(tx_id, &mut ops, direction, &username, &currency, amount) {
            Ok(post_balance) => {
                self.log
                    .update(&tx_id, TxPatch::new().status(TxStatus::Finished));
                info!(
                    worker = %self.id,
                    tx = %tx_id,
                    kind = %kind,
                    user = %username,
                    post_balance = post_balance,
                    "transaction finished"
                );
                WorkerOutcome {
                    worker: self.id,
                    sender: username,
                    receiver: None,
                    result: WorkerResult::Finished {
                        kind,
                        sender_balance: post_balance,
                        receiver_balance: None,
                    },
                }
            }
            Err(reason) => self.revert_and_fail(tx_id, ops, username, None, reason),
        }
    }

    fn run_send(
        &self,
        from: Username,
        to: Username,
        currency: Currency,
        amount: i64,
    ) -> WorkerOutcome {
        // The coordinator verified both users at admission; this re-check
        // only guards the log against racing a vanished account.
        let (Some(sender), Some(_receiver)) = (self.users.get(&from), self.users.get(&to)) else {
            warn!(worker = %self.id, from = %from, to = %to, "transfer endpoint vanished");
            return self.failed(from, Some(to), WorkerFailure::UserDoesNotExist);
        };

        if sender.balance(&currency) < amount {
            debug!(worker = %self.id, user = %from, currency = %currency, "not enough funds");
            return self.failed(from, Some(to), WorkerFailure::NotEnoughFunds);
        }

        let Some(tx_id) = self.open_transaction(TxKind::Send) else {
            return self.failed(from, Some(to), WorkerFailure::BalanceUpdate);
        };

        let mut ops = Vec::new();
        let from_balance = match self.apply(tx_id, &mut ops, OpDirection::Debit, &from, &currency, amount)
        {
            Ok(balance) => balance,
            Err(reason) => return self.revert_and_fail(tx_id, ops, from, Some(to), reason),
        };
        let to_balance = match self.apply(tx_id, &mut ops, OpDirection::Credit, &to, &currency, amount)
        {
            Ok(balance) => balance,
            Err(reason) => return self.revert_and_fail(tx_id, ops, from, Some(to), reason),
        };

        self.log
            .update(&tx_id, TxPatch::new().status(TxStatus::Finished));
        info!(
            worker = %self.id,
            tx = %tx_id,
            from = %from,
            to = %to,
            from_balance = from_balance,
            to_balance = to_balance,
            "transfer finished"
        );
        WorkerOutcome {
            worker: self.id,
            sender: from,
            receiver: Some(to),
            result: WorkerResult::Finished {
                kind: TxKind::Send,
                sender_balance: from_balance,
                receiver_balance: Some(to_balance),
            },
        }
    }

    /// Record a fresh in-progress transaction.
    fn open_transaction(&self, kind: TxKind) -> Option<TxId> {
        let tx_id = TxId::new();
        match self
            .log
            .create(TransactionRecord::new(tx_id, kind, self.id))
        {
            Ok(()) => Some(tx_id),
            Err(e) => {
                error!(worker = %self.id, tx = %tx_id, error = %e, "failed to record transaction");
                None
            }
        }
    }

    /// Apply one leg: recompute the balances mapping, store it, then append
    /// the finished operation to the transaction.
    fn apply(
        &self,
        tx_id: TxId,
        ops: &mut Vec<Operation>,
        direction: OpDirection,
        username: &str,
        currency: &str,
        amount: i64,
    ) -> Result<i64, &'static str> {
        let user = self.users.get(username).ok_or("user not found")?;
        let post_balance = user
            .balance(currency)
            .checked_add(direction.signed(amount))
            .ok_or("balance overflow")?;

        self.users
            .update_balances(username, user.balances_with(currency, post_balance))
            .map_err(|_| "user not found")?;

        ops.push(Operation {
            direction,
            username: username.to_string(),
            currency: currency.to_string(),
            amount,
            post_balance,
            status: OpStatus::Finished,
        });
        self.log
            .update(&tx_id, TxPatch::new().operations(ops.clone()));
        Ok(post_balance)
    }

    /// Compensate the finished legs in reverse order, then publish failure.
    ///
    /// A leg the compensation itself loses stays Finished and is a
    /// surviving balance discrepancy; it is logged, never retried.
    fn revert_and_fail(
        &self,
        tx_id: TxId,
        mut ops: Vec<Operation>,
        sender: Username,
        receiver: Option<Username>,
        reason: &'static str,
    ) -> WorkerOutcome {
        error!(
            worker = %self.id,
            tx = %tx_id,
            reason = reason,
            "transaction failed, reverting finished legs"
        );

        for op in ops.iter_mut().rev() {
            if op.status != OpStatus::Finished {
                continue;
            }
            if self.revert_leg(op) {
                op.status = OpStatus::Reverted;
            } else {
                error!(
                    worker = %self.id,
                    tx = %tx_id,
                    user = %op.username,
                    currency = %op.currency,
                    "revert failed, balance discrepancy survives"
                );
            }
        }

        self.log.update(
            &tx_id,
            TxPatch::new()
                .operations(ops)
                .status(TxStatus::FailedReverted(reason.to_string())),
        );
        self.failed(sender, receiver, WorkerFailure::BalanceUpdate)
    }

    /// Apply the inverse signed amount of one finished leg to the live
    /// balances.
    fn revert_leg(&self, op: &Operation) -> bool {
        let Some(user) = self.users.get(&op.username) else {
            return false;
        };
        let inverse = -op.direction.signed(op.amount);
        let Some(post_balance) = user.balance(&op.currency).checked_add(inverse) else {
            return false;
        };
        self.users
            .update_balances(&op.username, user.balances_with(&op.currency, post_balance))
            .is_ok()
    }

    fn failed(
        &self,
        sender: Username,
        receiver: Option<Username>,
        reason: WorkerFailure,
    ) -> WorkerOutcome {
        WorkerOutcome {
            worker: self.id,
            sender,
            receiver,
            result: WorkerResult::Failed { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::channel::completion_channel;

    fn harness() -> (Arc<UserStore>, Arc<TransactionLog>, CompletionSender) {
        // The tests below call the execution paths directly, so nothing is
        // ever published on the bus
        let (bus, _receiver) = completion_channel(16);
        (
            Arc::new(UserStore::new()),
            Arc::new(TransactionLog::new()),
            bus,
        )
    }

    fn seed(users: &UserStore, username: &str, currency: &str, minor: i64) {
        users.create(username).unwrap();
        let user = users.get(username).unwrap();
        users
            .update_balances(username, user.balances_with(currency, minor))
            .unwrap();
    }

    fn worker(
        users: &Arc<UserStore>,
        log: &Arc<TransactionLog>,
        bus: &CompletionSender,
    ) -> TransactionWorker {
        TransactionWorker {
            id: WorkerId::new(),
            users: Arc::clone(users),
            log: Arc::clone(log),
            bus: bus.clone(),
        }
    }

    #[tokio::test]
    async fn deposit_applies_credit_and_finishes() {
        let (users, log, bus) = harness();
        seed(&users, "alice", "usd", 500);

        let outcome = worker(&users, &log, &bus).run_single(
            TxKind::Deposit,
            "alice".to_string(),
            "usd".to_string(),
            1000,
        );

        assert!(matches!(
            outcome.result,
            WorkerResult::Finished {
                sender_balance: 1500,
                receiver_balance: None,
                ..
            }
        ));
        assert_eq!(users.get("alice").unwrap().balance("usd"), 1500);

        let record = &log.records()[0];
        assert_eq!(record.status, TxStatus::Finished);
        assert_eq!(record.operations.len(), 1);
        assert_eq!(record.operations[0].direction, OpDirection::Credit);
        assert_eq!(record.operations[0].post_balance, 1500);
    }

    #[tokio::test]
    async fn withdraw_insufficient_leaves_no_trace() {
        let (users, log, bus) = harness();
        seed(&users, "bob", "usd", 500);

        let outcome = worker(&users, &log, &bus).run_single(
            TxKind::Withdraw,
            "bob".to_string(),
            "usd".to_string(),
            1000,
        );

        assert!(matches!(
            outcome.result,
            WorkerResult::Failed {
                reason: WorkerFailure::NotEnoughFunds
            }
        ));
        // No transaction record and no mutation
        assert!(log.is_empty());
        assert_eq!(users.get("bob").unwrap().balance("usd"), 500);
    }

    #[tokio::test]
    async fn send_applies_both_legs() {
        let (users, log, bus) = harness();
        seed(&users, "alice", "usd", 1000);
        seed(&users, "bob", "usd", 0);

        let outcome = worker(&users, &log, &bus).run_send(
            "alice".to_string(),
            "bob".to_string(),
            "usd".to_string(),
            400,
        );

        assert!(matches!(
            outcome.result,
            WorkerResult::Finished {
                sender_balance: 600,
                receiver_balance: Some(400),
                ..
            }
        ));
        assert_eq!(users.get("alice").unwrap().balance("usd"), 600);
        assert_eq!(users.get("bob").unwrap().balance("usd"), 400);

        let record = &log.records()[0];
        assert_eq!(record.operations.len(), 2);
        assert_eq!(record.operations[0].direction, OpDirection::Debit);
        assert_eq!(record.operations[1].direction, OpDirection::Credit);
    }

    #[tokio::test]
    async fn failed_credit_leg_reverts_the_debit() {
        let (users, log, bus) = harness();
        seed(&users, "alice", "usd", 1000);
        // A receiver already at the ceiling makes the credit leg overflow
        seed(&users, "bob", "usd", i64::MAX);

        let outcome = worker(&users, &log, &bus).run_send(
            "alice".to_string(),
            "bob".to_string(),
            "usd".to_string(),
            400,
        );

        assert!(matches!(
            outcome.result,
            WorkerResult::Failed {
                reason: WorkerFailure::BalanceUpdate
            }
        ));
        // The debit was compensated, the receiver untouched
        assert_eq!(users.get("alice").unwrap().balance("usd"), 1000);
        assert_eq!(users.get("bob").unwrap().balance("usd"), i64::MAX);

        let record = &log.records()[0];
        assert!(matches!(record.status, TxStatus::FailedReverted(_)));
        assert_eq!(record.operations.len(), 1);
        assert_eq!(record.operations[0].status, OpStatus::Reverted);
    }
}
