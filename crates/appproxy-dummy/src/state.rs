//! The dummy application state machine.

use appproxy_core::types::{
    Block, CommitResponse, NodeState, Snapshot, StateHash, Transaction,
};
use appproxy_core::{ProxyError, ProxyHandler, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Snapshots kept by [`DummyState::new`].
pub const DEFAULT_RETAINED_SNAPSHOTS: usize = 128;

#[derive(Debug, Default)]
struct Ledger {
    committed: Vec<Transaction>,
    state_hash: StateHash,
    snapshots: BTreeMap<u64, Snapshot>,
    node_state: Option<NodeState>,
}

/// Chains a SHA-256 over every committed transaction.
///
/// The state hash after a block is the snapshot for that block, and
/// restoring from a snapshot simply adopts it as the current hash. Every
/// membership change is accepted. Only the most recent snapshots are kept.
#[derive(Debug)]
pub struct DummyState {
    ledger: RwLock<Ledger>,
    capacity: usize,
}

impl Default for DummyState {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyState {
    /// Creates an empty state retaining [`DEFAULT_RETAINED_SNAPSHOTS`] snapshots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_SNAPSHOTS)
    }

    /// Creates an empty state retaining up to `capacity` snapshots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            capacity: capacity.max(1),
        }
    }

    /// Current state hash.
    pub fn state_hash(&self) -> StateHash {
        self.ledger.read().state_hash.clone()
    }

    /// Every transaction committed so far, in commit order.
    pub fn committed_transactions(&self) -> Vec<Transaction> {
        self.ledger.read().committed.clone()
    }

    /// Last state reported by the engine.
    pub fn node_state(&self) -> Option<NodeState> {
        self.ledger.read().node_state
    }
}

fn chain(state_hash: &[u8], tx: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(state_hash);
    hasher.update(tx);
    hasher.finalize().to_vec()
}

#[async_trait]
impl ProxyHandler for DummyState {
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
        let mut ledger = self.ledger.write();
        for tx in block.transactions() {
            ledger.state_hash = chain(&ledger.state_hash, tx);
            ledger.committed.push(tx.clone());
        }
        let state_hash = ledger.state_hash.clone();
        ledger.snapshots.insert(block.index(), state_hash.clone());
        while ledger.snapshots.len() > self.capacity {
            ledger.snapshots.pop_first();
        }

        info!(
            index = block.index(),
            tx_count = block.tx_count(),
            state_hash = %hex::encode(&state_hash),
            "committed block"
        );

        let receipts = block
            .internal_transactions()
            .iter()
            .map(|itx| itx.as_accepted())
            .collect();
        Ok(CommitResponse::new(state_hash, receipts))
    }

    async fn state_change_handler(&self, state: NodeState) -> Result<()> {
        debug!(%state, "node state changed");
        self.ledger.write().node_state = Some(state);
        Ok(())
    }

    async fn snapshot_handler(&self, block_index: u64) -> Result<Snapshot> {
        self.ledger
            .read()
            .snapshots
            .get(&block_index)
            .cloned()
            .ok_or_else(|| ProxyError::application(format!("no snapshot for block {block_index}")))
    }

    async fn restore_handler(&self, snapshot: &[u8]) -> Result<StateHash> {
        let mut ledger = self.ledger.write();
        ledger.state_hash = snapshot.to_vec();
        info!(state_hash = %hex::encode(snapshot), "restored from snapshot");
        Ok(ledger.state_hash.clone())
    }
}
