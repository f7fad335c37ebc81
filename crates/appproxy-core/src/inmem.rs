//! In-process proxy.
//!
//! Engine calls are awaited directly on the handler; nothing is copied or
//! serialized.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::handler::ProxyHandler;
use crate::ingress::{submit_channel, SubmitReceiver, SubmitSender};
use crate::proxy::AppProxy;
use appproxy_types::{Block, CommitResponse, NodeState, Snapshot, StateHash, Transaction};
use async_trait::async_trait;
use parking_lot::Mutex;

/// An [`AppProxy`] that calls application handlers in the engine's process.
pub struct InmemProxy<H> {
    dispatcher: Dispatcher<H>,
    submit: SubmitSender,
    receiver: Mutex<Option<SubmitReceiver>>,
}

impl<H: ProxyHandler> InmemProxy<H> {
    /// Creates a proxy around the application's handlers.
    pub fn new(handler: H) -> Self {
        let (submit, receiver) = submit_channel();
        Self {
            dispatcher: Dispatcher::new(handler),
            submit,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Submits a transaction to the engine. Never blocks and never fails.
    pub fn submit_tx(&self, tx: Transaction) {
        self.submit.submit(tx);
    }

    /// Returns a producer handle the application can hand to other tasks.
    pub fn submitter(&self) -> SubmitSender {
        self.submit.clone()
    }

    /// Returns the application handler.
    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }
}

#[async_trait]
impl<H: ProxyHandler> AppProxy for InmemProxy<H> {
    async fn commit_block(&self, block: &Block) -> Result<CommitResponse> {
        self.dispatcher.commit_block(block).await
    }

    async fn on_state_changed(&self, state: NodeState) -> Result<()> {
        self.dispatcher.state_changed(state).await
    }

    async fn get_snapshot(&self, block_index: u64) -> Result<Snapshot> {
        self.dispatcher.snapshot(block_index).await
    }

    async fn restore(&self, snapshot: &[u8]) -> Result<StateHash> {
        self.dispatcher.restore(snapshot).await
    }

    fn take_submit_receiver(&self) -> Option<SubmitReceiver> {
        self.receiver.lock().take()
    }
}
