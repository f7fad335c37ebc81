//! Handler dispatch shared by the in-process and socket variants.
//!
//! The dispatcher is the boundary between engine code and application code:
//! a panicking handler is turned into [`ProxyError::Application`] here and
//! never unwinds into the engine's commit loop.

use crate::error::{ProxyError, Result};
use crate::handler::ProxyHandler;
use appproxy_types::{Block, CommitResponse, NodeState, Snapshot, StateHash};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Routes engine calls to a [`ProxyHandler`].
pub struct Dispatcher<H> {
    handler: H,

    /// Held while a block is applied or state is restored, so the two never
    /// overlap.
    apply_lock: Mutex<()>,
}

impl<H: ProxyHandler> Dispatcher<H> {
    /// Creates a dispatcher around an application handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            apply_lock: Mutex::new(()),
        }
    }

    /// Returns the wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Applies a block.
    pub async fn commit_block(&self, block: &Block) -> Result<CommitResponse> {
        let _guard = self.apply_lock.lock().await;
        let response = guarded("commit_block", self.handler.commit_handler(block)).await?;
        debug!(
            index = block.index(),
            tx_count = block.tx_count(),
            receipts = response.internal_transaction_receipts.len(),
            state_hash = %response.state_hash_hex(),
            "handler committed block"
        );
        Ok(response)
    }

    /// Forwards a state change notification.
    pub async fn state_changed(&self, state: NodeState) -> Result<()> {
        guarded("state_changed", self.handler.state_change_handler(state)).await
    }

    /// Requests a snapshot.
    pub async fn snapshot(&self, block_index: u64) -> Result<Snapshot> {
        guarded("get_snapshot", self.handler.snapshot_handler(block_index)).await
    }

    /// Restores state from a snapshot.
    pub async fn restore(&self, snapshot: &[u8]) -> Result<StateHash> {
        let _guard = self.apply_lock.lock().await;
        guarded("restore", self.handler.restore_handler(snapshot)).await
    }
}

/// Awaits a handler future, converting a panic into an application error.
async fn guarded<T, F>(call: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(call, %reason, "handler panicked");
            Err(ProxyError::Application(format!(
                "{call} handler panicked: {reason}"
            )))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
