//! Application half of the socket bridge.

use crate::client::RpcClient;
use crate::server::{RpcServer, Service};
use crate::wire::{Reply, Request};
use appproxy_core::types::Transaction;
use appproxy_core::{Dispatcher, ProxyError, ProxyHandler, Result, SocketConfig};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Routes engine calls to the application's handler.
struct HandlerService<H> {
    dispatcher: Arc<Dispatcher<H>>,
}

#[async_trait]
impl<H: ProxyHandler + 'static> Service for HandlerService<H> {
    async fn call(&self, request: Request) -> Reply {
        match request {
            Request::CommitBlock(block) => {
                Reply::from_result(self.dispatcher.commit_block(&block).await, Reply::Committed)
            }
            Request::StateChanged(state) => {
                Reply::from_result(self.dispatcher.state_changed(state).await, |()| Reply::Ack)
            }
            Request::GetSnapshot { block_index } => {
                Reply::from_result(self.dispatcher.snapshot(block_index).await, Reply::Snapshot)
            }
            Request::Restore { snapshot } => {
                Reply::from_result(self.dispatcher.restore(&snapshot).await, Reply::StateHash)
            }
            Request::SubmitTx { .. } => Reply::error(&ProxyError::protocol(
                "submit_tx is served by the engine",
            )),
        }
    }
}

/// Runs an application's [`ProxyHandler`] behind a socket.
///
/// Listens on `bind_addr` for engine calls and submits transactions to the
/// engine at `client_addr`.
pub struct SocketAppClient<H> {
    dispatcher: Arc<Dispatcher<H>>,
    server: RpcServer,
    engine: RpcClient,
}

impl<H: ProxyHandler + 'static> SocketAppClient<H> {
    /// Binds the listener for engine calls.
    pub async fn bind(config: &SocketConfig, handler: H) -> Result<Self> {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::new(handler));
        let service = Arc::new(HandlerService {
            dispatcher: dispatcher.clone(),
        });
        let server = RpcServer::bind(config.bind_addr, service).await?;

        Ok(Self {
            dispatcher,
            server,
            engine: RpcClient::from_config(config),
        })
    }

    /// Submits a transaction to the engine and waits for the acknowledgement.
    ///
    /// The acknowledgement only means the engine queued the transaction.
    pub async fn submit_tx(&self, tx: Transaction) -> Result<()> {
        debug!(len = tx.len(), "submitting transaction");
        match self.engine.call(Request::SubmitTx { tx }).await? {
            Reply::Ack => Ok(()),
            other => Err(ProxyError::protocol(format!(
                "unexpected reply to submit_tx: {other:?}"
            ))),
        }
    }

    /// Address the engine-call listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Address of the engine.
    pub fn engine_addr(&self) -> SocketAddr {
        self.engine.peer()
    }

    /// Returns the application's handler.
    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }

    /// Stops serving engine calls.
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}
