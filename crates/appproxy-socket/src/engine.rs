//! Engine half of the socket bridge.

use crate::client::RpcClient;
use crate::server::{RpcServer, Service};
use crate::wire::{Reply, Request};
use appproxy_core::types::{Block, CommitResponse, NodeState, Snapshot, StateHash};
use appproxy_core::{
    submit_channel, AppProxy, ProxyError, ProxyMetrics, Result, SocketConfig, SubmitReceiver,
    SubmitSender,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Feeds `SubmitTx` calls from the application into the ingress queue.
struct SubmitService {
    sender: SubmitSender,
    metrics: ProxyMetrics,
}

#[async_trait]
impl Service for SubmitService {
    async fn call(&self, request: Request) -> Reply {
        match request {
            Request::SubmitTx { tx } => {
                debug!(len = tx.len(), "transaction submitted over socket");
                self.sender.submit(tx);
                self.metrics.record_submitted();
                Reply::Ack
            }
            other => Reply::error(&ProxyError::protocol(format!(
                "{} is not served by the engine",
                other.method()
            ))),
        }
    }
}

/// [`AppProxy`] for an application running in another process.
///
/// Engine calls are forwarded to `client_addr`. Transactions submitted by
/// the application arrive on `bind_addr` and land on the ingress queue.
pub struct SocketAppProxy {
    client: RpcClient,
    server: RpcServer,
    receiver: Mutex<Option<SubmitReceiver>>,
}

impl SocketAppProxy {
    /// Binds the submit listener. The application is dialed on first use.
    pub async fn bind(config: &SocketConfig) -> Result<Self> {
        Self::bind_with_metrics(config, ProxyMetrics::new()).await
    }

    /// Like [`bind`](Self::bind), counting submissions into `metrics`.
    pub async fn bind_with_metrics(config: &SocketConfig, metrics: ProxyMetrics) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = submit_channel();
        let server = RpcServer::bind(config.bind_addr, Arc::new(SubmitService { sender, metrics }))
            .await?;

        Ok(Self {
            client: RpcClient::from_config(config),
            server,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Address the submit listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Address of the application.
    pub fn app_addr(&self) -> SocketAddr {
        self.client.peer()
    }
}

fn unexpected(reply: Reply) -> ProxyError {
    ProxyError::protocol(format!("unexpected reply: {reply:?}"))
}

#[async_trait]
impl AppProxy for SocketAppProxy {
    async fn commit_block(&self, block: &Block) -> Result<CommitResponse> {
        match self.client.call(Request::CommitBlock(block.clone())).await? {
            Reply::Committed(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }

    async fn on_state_changed(&self, state: NodeState) -> Result<()> {
        match self.client.call(Request::StateChanged(state)).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn get_snapshot(&self, block_index: u64) -> Result<Snapshot> {
        match self.client.call(Request::GetSnapshot { block_index }).await? {
            Reply::Snapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    async fn restore(&self, snapshot: &[u8]) -> Result<StateHash> {
        let request = Request::Restore {
            snapshot: snapshot.to_vec(),
        };
        match self.client.call(request).await? {
            Reply::StateHash(state_hash) => Ok(state_hash),
            other => Err(unexpected(other)),
        }
    }

    fn take_submit_receiver(&self) -> Option<SubmitReceiver> {
        self.receiver.lock().take()
    }
}
