//! Application-side duplicate commit protection.
//!
//! After a reconnection the engine may deliver a block index the application
//! already applied. [`Idempotent`] answers such a redelivery with the response
//! computed the first time instead of applying the block again.

use crate::error::{ProxyError, Result};
use crate::handler::ProxyHandler;
use appproxy_types::{Block, CommitResponse, NodeState, Snapshot, StateHash};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

/// Number of commit responses kept for replay by default.
pub const DEFAULT_RETAINED_RESPONSES: usize = 128;

#[derive(Debug, Default)]
struct CommitLog {
    last: Option<u64>,
    responses: BTreeMap<u64, CommitResponse>,
}

/// What to do with an incoming block index.
enum Admission {
    Apply,
    Replay(CommitResponse),
}

impl CommitLog {
    fn admit(&self, index: u64) -> Result<Admission> {
        if let Some(response) = self.responses.get(&index) {
            return Ok(Admission::Replay(response.clone()));
        }
        match self.last {
            None => Ok(Admission::Apply),
            Some(last) if index <= last => Err(ProxyError::protocol(format!(
                "block {index} was already applied and its response is no longer retained"
            ))),
            Some(last) if index != last + 1 => Err(ProxyError::protocol(format!(
                "expected block {}, got {index}",
                last + 1
            ))),
            Some(_) => Ok(Admission::Apply),
        }
    }

    fn record(&mut self, index: u64, response: CommitResponse, capacity: usize) {
        self.last = Some(index);
        self.responses.insert(index, response);
        while self.responses.len() > capacity {
            self.responses.pop_first();
        }
    }
}

/// Wraps a handler so that commits are idempotent by block index.
///
/// Policy:
/// - a retained index replays the stored response
/// - an older index that is no longer retained is a protocol violation
/// - after the first commit, indices must be contiguous
/// - a successful restore starts a fresh sequence
pub struct Idempotent<H> {
    inner: H,
    log: Mutex<CommitLog>,
    capacity: usize,
}

impl<H: ProxyHandler> Idempotent<H> {
    /// Wraps a handler, retaining [`DEFAULT_RETAINED_RESPONSES`] responses.
    pub fn new(inner: H) -> Self {
        Self::with_capacity(inner, DEFAULT_RETAINED_RESPONSES)
    }

    /// Wraps a handler, retaining up to `capacity` responses.
    pub fn with_capacity(inner: H, capacity: usize) -> Self {
        Self {
            inner,
            log: Mutex::new(CommitLog::default()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Returns the index of the last applied block.
    pub fn last_applied(&self) -> Option<u64> {
        self.log.lock().last
    }
}

#[async_trait]
impl<H: ProxyHandler> ProxyHandler for Idempotent<H> {
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
        let index = block.index();
        let admission = self.log.lock().admit(index)?;
        if let Admission::Replay(response) = admission {
            debug!(index, "replaying response for redelivered block");
            return Ok(response);
        }

        let response = self.inner.commit_handler(block).await?;
        self.log
            .lock()
            .record(index, response.clone(), self.capacity);
        Ok(response)
    }

    async fn state_change_handler(&self, state: NodeState) -> Result<()> {
        self.inner.state_change_handler(state).await
    }

    async fn snapshot_handler(&self, block_index: u64) -> Result<Snapshot> {
        self.inner.snapshot_handler(block_index).await
    }

    async fn restore_handler(&self, snapshot: &[u8]) -> Result<StateHash> {
        let state_hash = self.inner.restore_handler(snapshot).await?;
        *self.log.lock() = CommitLog::default();
        Ok(state_hash)
    }
}
