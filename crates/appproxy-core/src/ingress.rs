//! Transaction ingress queue.
//!
//! An unbounded multi-producer, single-consumer channel. Producers never block:
//! the engine drains the queue at its own pace.

use appproxy_types::Transaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Creates a connected sender/receiver pair.
pub fn submit_channel() -> (SubmitSender, SubmitReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let submitted = Arc::new(AtomicU64::new(0));
    (
        SubmitSender {
            sender,
            submitted: submitted.clone(),
        },
        SubmitReceiver {
            receiver,
            submitted,
        },
    )
}

/// Producer handle. Cheap to clone; any number of tasks may submit.
#[derive(Debug, Clone)]
pub struct SubmitSender {
    sender: mpsc::UnboundedSender<Transaction>,
    submitted: Arc<AtomicU64>,
}

impl SubmitSender {
    /// Enqueues a transaction.
    ///
    /// Never fails. If the engine has dropped its receiver the transaction is
    /// discarded with a warning; it will simply never appear in a block.
    pub fn submit(&self, tx: Transaction) {
        let len = tx.len();
        if self.sender.send(tx).is_err() {
            warn!(len, "ingress queue closed, dropping transaction");
            return;
        }
        let total = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(len, total, "enqueued transaction");
    }

    /// Returns true once the engine has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Total transactions accepted into the queue.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

/// Consumer handle, owned by the engine.
#[derive(Debug)]
pub struct SubmitReceiver {
    receiver: mpsc::UnboundedReceiver<Transaction>,
    submitted: Arc<AtomicU64>,
}

impl SubmitReceiver {
    /// Waits for the next transaction. Returns `None` when every sender is gone.
    pub async fn recv(&mut self) -> Option<Transaction> {
        self.receiver.recv().await
    }

    /// Returns a queued transaction without waiting.
    pub fn try_recv(&mut self) -> Option<Transaction> {
        self.receiver.try_recv().ok()
    }

    /// Takes up to `max` queued transactions in arrival order without waiting.
    pub fn drain(&mut self, max: usize) -> Vec<Transaction> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.receiver.try_recv() {
                Ok(tx) => batch.push(tx),
                Err(_) => break,
            }
        }
        batch
    }

    /// Total transactions accepted into the queue so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}
