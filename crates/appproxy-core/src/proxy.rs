//! The engine-facing proxy contract.

use crate::error::Result;
use crate::ingress::SubmitReceiver;
use appproxy_types::{Block, CommitResponse, NodeState, Snapshot, StateHash};
use async_trait::async_trait;

/// What the consensus engine needs from the application, regardless of
/// whether it runs in-process or behind a socket.
///
/// The engine calls [`commit_block`](AppProxy::commit_block) and
/// [`on_state_changed`](AppProxy::on_state_changed) from a single task, one at
/// a time, in increasing block order. Snapshot and restore may come from a
/// separate sync task.
#[async_trait]
pub trait AppProxy: Send + Sync {
    /// Delivers one committed block.
    ///
    /// An error means the block was not applied (or the outcome is unknown)
    /// and must be surfaced to the engine; it is never retried here.
    async fn commit_block(&self, block: &Block) -> Result<CommitResponse>;

    /// Notifies the application of an engine state change.
    async fn on_state_changed(&self, state: NodeState) -> Result<()>;

    /// Requests the application state as of `block_index`.
    async fn get_snapshot(&self, block_index: u64) -> Result<Snapshot>;

    /// Reinitializes application state and returns the resulting state hash.
    async fn restore(&self, snapshot: &[u8]) -> Result<StateHash>;

    /// Hands out the consumer end of the ingress queue.
    ///
    /// Returns `None` once it has been taken.
    fn take_submit_receiver(&self) -> Option<SubmitReceiver>;
}
