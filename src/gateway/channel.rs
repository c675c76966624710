//! Gateway Channels
//!
//! Cross-task communication around the coordinator: the submission channel
//! clients call through (request + oneshot reply), and the completion bus
//! every worker publishes its terminal outcome on. The coordinator is the
//! sole subscriber of the bus.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::BankError;

use super::types::{Request, Settled, Submission, WorkerOutcome};

/// Clone-able client handle to the coordinator.
#[derive(Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<Submission>,
}

impl GatewayHandle {
    /// Send a request and wait for its terminal reply.
    ///
    /// The call blocks until admission rejects the request synchronously, a
    /// balance read answers it, or the worker it was dispatched to
    /// publishes an outcome.
    pub async fn submit(&self, request: Request) -> Result<Settled, BankError> {
        let (waiter, reply) = oneshot::channel();

        self.tx
            .send(Submission { request, waiter })
            .await
            .map_err(|_| {
                error!("gateway submission channel closed");
                BankError::Unexpected
            })?;

        reply.await.map_err(|_| {
            error!("gateway dropped a reply channel");
            BankError::Unexpected
        })?
    }
}

/// Create the submission channel pair.
pub(crate) fn submission_channel(buffer: usize) -> (GatewayHandle, mpsc::Receiver<Submission>) {
    let (tx, rx) = mpsc::channel(buffer);
    (GatewayHandle { tx }, rx)
}

/// Publisher half of the completion bus. Every worker holds a clone.
#[derive(Clone)]
pub struct CompletionSender {
    tx: mpsc::Sender<WorkerOutcome>,
}

impl CompletionSender {
    /// Publish a terminal outcome. Delivery to a gone coordinator is a
    /// no-op.
    pub async fn publish(&self, outcome: WorkerOutcome) {
        if self.tx.send(outcome).await.is_err() {
            debug!("completion bus closed, dropping worker outcome");
        }
    }
}

/// Subscriber half of the completion bus.
pub struct CompletionReceiver {
    rx: mpsc::Receiver<WorkerOutcome>,
}

impl CompletionReceiver {
    /// Receive the next outcome (blocking until available or closed).
    pub async fn recv(&mut self) -> Option<WorkerOutcome> {
        self.rx.recv().await
    }
}

/// Create a new completion bus pair.
pub(crate) fn completion_channel(buffer: usize) -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = mpsc::channel(buffer);
    (CompletionSender { tx }, CompletionReceiver { rx })
}
