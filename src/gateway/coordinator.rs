//! Transaction Gateway Coordinator
//!
//! The single task that admission-controls every request, locks one or two
//! accounts per operation, dispatches workers, and matches their outcomes
//! back to blocked callers. All slot state lives inside this task, so every
//! transition is atomic per request with no locking of its own.
//!
//! Event sources, processed one at a time to completion:
//! - client submissions (requests plus their reply channels)
//! - worker outcomes from the completion bus
//! - internal advance events, drained before the next external message

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::core_types::{Username, WorkerId};
use crate::error::BankError;
use crate::store::transactions::TransactionLog;
use crate::store::users::UserStore;

use super::channel::{self, CompletionReceiver, CompletionSender, GatewayHandle};
use super::slot::UserSlot;
use super::types::{
    Request, Settled, Submission, Waiter, WorkerFailure, WorkerOutcome, WorkerResult,
};
use super::worker::TransactionWorker;

/// Internal queue-advance event.
#[derive(Debug)]
enum Advance {
    /// An occupancy of the user ended. `charged` says whether it consumed
    /// the user's admission budget; the receiving leg of a transfer never
    /// does.
    Completed { username: Username, charged: bool },
    /// A parked transfer may be able to run now. Speculative: ignored
    /// unless the slot is free with a queued head.
    Retry { username: Username },
}

pub struct Gateway {
    /// Per-user slots, created lazily on first reference
    users: HashMap<Username, UserSlot>,
    /// Waiter for every running worker
    inflight: HashMap<WorkerId, Waiter>,
    /// Senders whose head-of-queue transfer waits for a busy receiver,
    /// keyed by that receiver
    blocked_on: HashMap<Username, VecDeque<Username>>,
    /// Internal advance queue, drained before the next external message
    advances: VecDeque<Advance>,
    store: Arc<UserStore>,
    log: Arc<TransactionLog>,
    submissions: mpsc::Receiver<Submission>,
    completions: CompletionReceiver,
    bus: CompletionSender,
    limit: usize,
}

impl Gateway {
    /// Spawn the coordinator task and return the client handle.
    ///
    /// The task drains and exits once every handle clone is dropped and no
    /// worker is in flight.
    pub fn spawn(
        store: Arc<UserStore>,
        log: Arc<TransactionLog>,
        config: &GatewayConfig,
    ) -> GatewayHandle {
        let (handle, submissions) = channel::submission_channel(config.submit_queue);
        let (bus, completions) = channel::completion_channel(config.completion_queue);

        let gateway = Self {
            users: HashMap::new(),
            inflight: HashMap::new(),
            blocked_on: HashMap::new(),
            advances: VecDeque::new(),
            store,
            log,
            submissions,
            completions,
            bus,
            limit: config.admission_limit,
        };
        tokio::spawn(gateway.run());
        handle
    }

    async fn run(mut self) {
        info!(admission_limit = self.limit, "gateway coordinator started");
        let mut submissions_open = true;

        loop {
            while let Some(advance) = self.advances.pop_front() {
                self.advance(advance);
            }

            // With the handles gone, no worker in flight and no advance
            // pending, every queue is provably empty.
            if !submissions_open && self.inflight.is_empty() {
                break;
            }

            tokio::select! {
                outcome = self.completions.recv() => {
                    // The coordinator holds a publisher clone, so the bus
                    // cannot report closed while this loop runs.
                    if let Some(outcome) = outcome {
                        self.on_completion(outcome);
                    }
                }
                submission = self.submissions.recv(), if submissions_open => {
                    match submission {
                        Some(Submission { request, waiter }) => self.on_submit(request, waiter),
                        None => submissions_open = false,
                    }
                }
            }
        }
        debug!("all gateway handles dropped, coordinator drained");
    }

    // ========================================================================
    // Admission
    // ========================================================================

    fn on_submit(&mut self, request: Request, waiter: Waiter) {
        match request {
            Request::Send { .. } => self.admit_send(request, waiter),
            _ => self.admit_single(request, waiter),
        }
    }

    /// Admission for deposit, withdraw and balance.
    fn admit_single(&mut self, request: Request, waiter: Waiter) {
        let username = request.subject().to_string();
        let can_capture = self
            .users
            .get(&username)
            .map(|slot| slot.can_capture())
            .unwrap_or(true);

        if can_capture {
            // Existence is verified before any budget is consumed; a slot
            // lazily created for an unknown user is dropped again.
            if !self.store.contains(&username) {
                self.discard_idle_slot(&username);
                let _ = waiter.send(Err(BankError::UserDoesNotExist));
                return;
            }
            self.users
                .entry(username)
                .or_insert_with(UserSlot::new)
                .capture();
            self.start_single(request, waiter);
        } else {
            let Some(slot) = self.users.get_mut(&username) else {
                return; // unreachable: !can_capture implies the slot exists
            };
            if !slot.has_budget(self.limit) {
                debug!(user = %username, pending = slot.pending(), "admission queue full");
                let _ = waiter.send(Err(BankError::TooManyRequestsToUser));
                return;
            }
            slot.enqueue(request, waiter);
        }
    }

    /// Admission for transfers: both slots are evaluated in one step, so
    /// the two-account lock is acquired both-or-neither.
    fn admit_send(&mut self, request: Request, waiter: Waiter) {
        let Request::Send { ref from, ref to, .. } = request else {
            return;
        };
        let (from, to) = (from.clone(), to.clone());

        let sender_free = self
            .users
            .get(&from)
            .map(|slot| slot.can_capture())
            .unwrap_or(true);
        let receiver_free = self
            .users
            .get(&to)
            .map(|slot| slot.is_available())
            .unwrap_or(true);

        if sender_free && receiver_free {
            if !self.store.contains(&from) {
                self.discard_idle_slot(&from);
                let _ = waiter.send(Err(BankError::SenderNotFound));
                return;
            }
            if !self.store.contains(&to) {
                self.discard_idle_slot(&to);
                let _ = waiter.send(Err(BankError::ReceiverNotFound));
                return;
            }
            self.users
                .entry(from)
                .or_insert_with(UserSlot::new)
                .capture();
            // Receivers are locked but never charged: inbound credits must
            // not exhaust a popular receiver's admission budget.
            self.users.entry(to).or_insert_with(UserSlot::new).occupy();
            self.dispatch(request, waiter);
        } else {
            // The sender is the rate-limited party.
            let slot = self.users.entry(from.clone()).or_insert_with(UserSlot::new);
            if !slot.has_budget(self.limit) {
                debug!(user = %from, pending = slot.pending(), "admission queue full");
                let _ = waiter.send(Err(BankError::TooManyRequestsToUser));
                return;
            }
            slot.enqueue(request, waiter);
            if sender_free {
                // The transfer sits at the head of an otherwise idle
                // sender: it waits for the receiver's release.
                self.block_on(to, from);
            }
        }
    }

    /// Run a captured single-account request.
    fn start_single(&mut self, request: Request, waiter: Waiter) {
        match request {
            Request::Balance { username, currency } => {
                // Read inline, no worker. The advance behind the reply
                // returns the slot within the same coordinator drain.
                match self.store.get(&username) {
                    Some(user) => {
                        let _ = waiter.send(Ok(Settled::Balance(user.balance(&currency))));
                    }
                    None => {
                        let _ = waiter.send(Err(BankError::UserDoesNotExist));
                    }
                }
                self.post_completed(username, true);
            }
            request => self.dispatch(request, waiter),
        }
    }

    /// Spawn a worker for an admitted mutation and register its waiter.
    fn dispatch(&mut self, request: Request, waiter: Waiter) {
        let worker = TransactionWorker::spawn(
            request,
            Arc::clone(&self.store),
            Arc::clone(&self.log),
            self.bus.clone(),
        );
        self.inflight.insert(worker, waiter);
    }

    // ========================================================================
    // Completion
    // ========================================================================

    fn on_completion(&mut self, outcome: WorkerOutcome) {
        let WorkerOutcome {
            worker,
            sender,
            receiver,
            result,
        } = outcome;

        let reply = match result {
            WorkerResult::Finished {
                kind,
                sender_balance,
                receiver_balance,
            } => {
                debug!(worker = %worker, kind = %kind, "worker finished");
                match receiver_balance {
                    Some(to_balance) => Ok(Settled::Transfer {
                        from_balance: sender_balance,
                        to_balance,
                    }),
                    None => Ok(Settled::Balance(sender_balance)),
                }
            }
            WorkerResult::Failed { reason } => Err(match reason {
                WorkerFailure::NotEnoughFunds => BankError::NotEnoughFunds,
                WorkerFailure::UserDoesNotExist | WorkerFailure::BalanceUpdate => {
                    BankError::Unexpected
                }
            }),
        };

        match self.inflight.remove(&worker) {
            Some(waiter) => {
                // Delivery to a caller that went away is a no-op.
                let _ = waiter.send(reply);
            }
            None => warn!(worker = %worker, "completion for unknown worker"),
        }

        // Both endpoints advance regardless of outcome; only the sender
        // carried an admission charge.
        self.post_completed(sender, true);
        if let Some(receiver) = receiver {
            self.post_completed(receiver, false);
        }
    }

    // ========================================================================
    // Advance
    // ========================================================================

    fn post_completed(&mut self, username: Username, charged: bool) {
        self.advances.push_back(Advance::Completed { username, charged });
    }

    fn post_retry(&mut self, username: Username) {
        self.advances.push_back(Advance::Retry { username });
    }

    fn advance(&mut self, advance: Advance) {
        match advance {
            Advance::Completed { username, charged } => {
                let Some(slot) = self.users.get_mut(&username) else {
                    warn!(user = %username, "advance for unknown slot");
                    return;
                };
                if charged {
                    slot.discharge();
                }
                match slot.pop_head() {
                    Some((request, waiter)) => self.readmit(username, request, waiter),
                    None => {
                        slot.release_idle();
                        if !self.store.contains(&username) {
                            // Slots are only worth keeping for registered
                            // users
                            self.users.remove(&username);
                        }
                        self.wake_blocked(&username);
                    }
                }
            }
            Advance::Retry { username } => {
                let Some(slot) = self.users.get_mut(&username) else {
                    return;
                };
                // Speculative: something else may have taken the slot, or
                // the parked transfer may already be running.
                if !slot.is_available() {
                    return;
                }
                if let Some((request, waiter)) = slot.pop_head() {
                    self.readmit(username, request, waiter);
                }
            }
        }
    }

    /// Re-admit a popped queue head as if it had just arrived, without
    /// re-checking the queue bound (it was already counted). A synchronous
    /// failure replies here and posts another advance; the loop runs via
    /// the event queue, never by recursion.
    fn readmit(&mut self, username: Username, request: Request, waiter: Waiter) {
        match request {
            Request::Balance {
                username: subject,
                currency,
            } => {
                self.occupy(&username);
                match self.store.get(&subject) {
                    Some(user) => {
                        let _ = waiter.send(Ok(Settled::Balance(user.balance(&currency))));
                    }
                    None => {
                        let _ = waiter.send(Err(BankError::UserDoesNotExist));
                    }
                }
                self.post_completed(username, true);
            }
            Request::Deposit { .. } | Request::Withdraw { .. } => {
                if !self.store.contains(&username) {
                    let _ = waiter.send(Err(BankError::UserDoesNotExist));
                    self.post_completed(username, true);
                    return;
                }
                self.occupy(&username);
                self.dispatch(request, waiter);
            }
            Request::Send { ref from, ref to, .. } => {
                let (from, to) = (from.clone(), to.clone());
                let receiver_free = self
                    .users
                    .get(&to)
                    .map(|slot| slot.is_available())
                    .unwrap_or(true);

                if !receiver_free {
                    // No hold-and-wait: park the transfer back at the head,
                    // release the sender, retry when the receiver frees.
                    if let Some(slot) = self.users.get_mut(&username) {
                        slot.push_head(request, waiter);
                        slot.release();
                    }
                    debug!(user = %username, receiver = %to, "transfer parked on busy receiver");
                    self.block_on(to, username.clone());
                    // The sender itself is free meanwhile: inbound
                    // transfers may take it.
                    self.wake_blocked(&username);
                    return;
                }

                if !self.store.contains(&from) {
                    let _ = waiter.send(Err(BankError::SenderNotFound));
                    self.post_completed(username, true);
                    return;
                }
                if !self.store.contains(&to) {
                    let _ = waiter.send(Err(BankError::ReceiverNotFound));
                    self.post_completed(username, true);
                    return;
                }

                self.occupy(&username);
                self.users.entry(to).or_insert_with(UserSlot::new).occupy();
                self.dispatch(request, waiter);
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn occupy(&mut self, username: &str) {
        if let Some(slot) = self.users.get_mut(username) {
            slot.occupy();
        }
    }

    /// Register `sender` as waiting for `receiver`'s slot to free up.
    fn block_on(&mut self, receiver: Username, sender: Username) {
        self.blocked_on
            .entry(receiver)
            .or_default()
            .push_back(sender);
    }

    /// Retry every transfer parked on `receiver`. The first retried sender
    /// wins the slot; the rest park again.
    fn wake_blocked(&mut self, receiver: &str) {
        if let Some(senders) = self.blocked_on.remove(receiver) {
            for sender in senders {
                debug!(user = %sender, receiver = %receiver, "receiver released, retrying parked transfer");
                self.post_retry(sender);
            }
        }
    }

    /// Drop a slot that was lazily created for an unknown user.
    fn discard_idle_slot(&mut self, username: &str) {
        if self.users.get(username).is_some_and(|slot| slot.is_idle()) {
            self.users.remove(username);
        }
    }
}
