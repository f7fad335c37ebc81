//! Engine-side commit sequencing.
//!
//! [`CommitDriver`] sits between the engine's control loop and any
//! [`AppProxy`]. It enforces the commit protocol the engine relies on:
//!
//! - blocks go out one at a time, in strictly increasing index order
//! - a failed commit does not advance the sequence, so the engine may reissue
//!   the same index or halt
//! - the receipt list must mirror the block's internal transactions
//! - restore never overlaps a commit
//! - state change failures are logged and swallowed

use crate::error::{ProxyError, Result};
use crate::ingress::SubmitReceiver;
use crate::metrics::ProxyMetrics;
use crate::proxy::AppProxy;
use appproxy_types::{Block, CommitResponse, NodeState, Snapshot, StateHash};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Drives an [`AppProxy`] on behalf of the consensus engine.
pub struct CommitDriver<P: ?Sized> {
    proxy: Arc<P>,

    /// Index of the last block the application acknowledged. Held for the
    /// whole commit or restore so the two are serialized.
    last_committed: Mutex<Option<u64>>,

    metrics: ProxyMetrics,
}

impl<P: AppProxy + ?Sized> CommitDriver<P> {
    /// Creates a driver that has not committed anything yet.
    pub fn new(proxy: Arc<P>) -> Self {
        Self::with_metrics(proxy, ProxyMetrics::new())
    }

    /// Creates a driver that reports into the given metrics.
    pub fn with_metrics(proxy: Arc<P>, metrics: ProxyMetrics) -> Self {
        Self {
            proxy,
            last_committed: Mutex::new(None),
            metrics,
        }
    }

    /// Resumes after `index`, e.g. when the engine reloads a persisted ledger.
    pub fn resume_after(self, index: u64) -> Self {
        self.metrics.set_last_committed(index);
        Self {
            last_committed: Mutex::new(Some(index)),
            ..self
        }
    }

    /// Returns the underlying proxy.
    pub fn proxy(&self) -> &Arc<P> {
        &self.proxy
    }

    /// Returns the metrics this driver reports into.
    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }

    /// Returns the index of the last acknowledged block.
    pub async fn last_committed(&self) -> Option<u64> {
        *self.last_committed.lock().await
    }

    /// Delivers a block and validates the response.
    pub async fn commit_block(&self, block: &Block) -> Result<CommitResponse> {
        let mut last = self.last_committed.lock().await;
        let index = block.index();

        if let Some(last_index) = *last {
            if index <= last_index {
                return Err(ProxyError::protocol(format!(
                    "block {index} is not after last committed block {last_index}"
                )));
            }
        }

        let start = Instant::now();
        let result = self
            .proxy
            .commit_block(block)
            .await
            .and_then(|response| check_receipts(block, response));
        self.metrics
            .record_call("commit_block", &result, start.elapsed());

        match result {
            Ok(response) => {
                *last = Some(index);
                self.metrics.set_last_committed(index);
                info!(
                    index,
                    tx_count = block.tx_count(),
                    internal_tx_count = block.internal_transactions().len(),
                    state_hash = %response.state_hash_hex(),
                    "committed block"
                );
                Ok(response)
            }
            Err(e) => {
                error!(index, kind = %e.kind(), error = %e, "commit failed");
                Err(e)
            }
        }
    }

    /// Notifies the application of a state change. Failures are logged only.
    pub async fn notify_state_changed(&self, state: NodeState) {
        let start = Instant::now();
        let result = self.proxy.on_state_changed(state).await;
        self.metrics
            .record_call("state_changed", &result, start.elapsed());
        if let Err(e) = result {
            warn!(%state, error = %e, "state change notification failed");
        }
    }

    /// Requests a snapshot for fast-sync.
    ///
    /// An [`ProxyError::Unsupported`] result means fast-sync is unavailable
    /// and the engine should fall back to replay.
    pub async fn get_snapshot(&self, block_index: u64) -> Result<Snapshot> {
        let start = Instant::now();
        let result = self.proxy.get_snapshot(block_index).await;
        self.metrics
            .record_call("get_snapshot", &result, start.elapsed());
        if let Err(ref e) = result {
            if e.is_unsupported() {
                info!(block_index, "application has no snapshots, fast-sync unavailable");
            } else {
                warn!(block_index, error = %e, "snapshot request failed");
            }
        }
        result
    }

    /// Restores application state to the snapshot taken at `block_index`.
    ///
    /// On success the sequence continues after `block_index`.
    pub async fn restore(&self, block_index: u64, snapshot: &[u8]) -> Result<StateHash> {
        let mut last = self.last_committed.lock().await;

        let start = Instant::now();
        let result = self.proxy.restore(snapshot).await;
        self.metrics.record_call("restore", &result, start.elapsed());

        match result {
            Ok(state_hash) => {
                *last = Some(block_index);
                self.metrics.set_last_committed(block_index);
                info!(
                    block_index,
                    state_hash = %hex_prefix(&state_hash),
                    "restored application state"
                );
                Ok(state_hash)
            }
            Err(e) => {
                error!(block_index, kind = %e.kind(), error = %e, "restore failed");
                Err(e)
            }
        }
    }

    /// Takes the consumer end of the proxy's ingress queue.
    pub fn take_submit_receiver(&self) -> Option<SubmitReceiver> {
        self.proxy.take_submit_receiver()
    }
}

/// Receipts must answer the block's internal transactions one for one, in order.
fn check_receipts(block: &Block, response: CommitResponse) -> Result<CommitResponse> {
    let expected = block.internal_transactions();
    let receipts = &response.internal_transaction_receipts;

    if receipts.len() != expected.len() {
        return Err(ProxyError::protocol(format!(
            "block {} has {} internal transactions but {} receipts",
            block.index(),
            expected.len(),
            receipts.len()
        )));
    }

    for (position, (itx, receipt)) in expected.iter().zip(receipts).enumerate() {
        if receipt.internal_transaction != *itx {
            return Err(ProxyError::protocol(format!(
                "receipt {position} of block {} does not match its internal transaction",
                block.index()
            )));
        }
    }

    Ok(response)
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
