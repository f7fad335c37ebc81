//! Application-side handlers.

use crate::error::{ProxyError, Result};
use appproxy_types::{Block, CommitResponse, NodeState, Snapshot, StateHash};
use async_trait::async_trait;
use std::sync::Arc;

/// Callbacks an application registers to receive engine calls.
///
/// Both the in-process and the socket variants dispatch to the same handler,
/// so an application is written once regardless of where it runs. Handlers
/// own their state; if several handlers touch shared state the application
/// provides its own locking.
#[async_trait]
pub trait ProxyHandler: Send + Sync {
    /// Applies a committed block and returns the resulting state hash plus one
    /// receipt per internal transaction, in block order.
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse>;

    /// Observes an engine state change.
    async fn state_change_handler(&self, _state: NodeState) -> Result<()> {
        Ok(())
    }

    /// Returns the application state as of `block_index`.
    async fn snapshot_handler(&self, _block_index: u64) -> Result<Snapshot> {
        Err(ProxyError::unsupported("snapshots are not implemented"))
    }

    /// Reinitializes application state from a snapshot and returns the
    /// resulting state hash.
    async fn restore_handler(&self, _snapshot: &[u8]) -> Result<StateHash> {
        Err(ProxyError::unsupported("restore is not implemented"))
    }
}

#[async_trait]
impl<H: ProxyHandler + ?Sized> ProxyHandler for Arc<H> {
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
        (**self).commit_handler(block).await
    }

    async fn state_change_handler(&self, state: NodeState) -> Result<()> {
        (**self).state_change_handler(state).await
    }

    async fn snapshot_handler(&self, block_index: u64) -> Result<Snapshot> {
        (**self).snapshot_handler(block_index).await
    }

    async fn restore_handler(&self, snapshot: &[u8]) -> Result<StateHash> {
        (**self).restore_handler(snapshot).await
    }
}
