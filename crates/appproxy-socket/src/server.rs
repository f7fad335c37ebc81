//! Serving side of a socket link.

use crate::wire::{Frame, Reply, Request, WireCodec};
use appproxy_core::{ProxyError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Answers requests arriving on an [`RpcServer`].
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Handles one request. Failures are reported as [`Reply::Error`].
    async fn call(&self, request: Request) -> Reply;
}

/// Accepts connections and serves each one with a [`Service`].
///
/// Requests on a single connection are handled one at a time, in arrival
/// order. Dropping the server stops the accept loop and every connection.
pub struct RpcServer {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl RpcServer {
    /// Binds `addr` and starts serving.
    pub async fn bind<S: Service>(addr: SocketAddr, service: Arc<S>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::transport(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ProxyError::transport(format!("failed to read bound address: {e}")))?;
        info!(%local_addr, "listening");

        let accept_task = tokio::spawn(accept_loop(listener, service));
        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop<S: Service>(listener: TcpListener, service: Arc<S>) {
    // Aborting this task drops the set, which aborts every connection.
    let mut connections = JoinSet::new();
    loop {
        while connections.try_join_next().is_some() {}

        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                connections.spawn(serve_connection(stream, peer, service.clone()));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }
    }
}

async fn serve_connection<S: Service>(stream: TcpStream, peer: SocketAddr, service: Arc<S>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "failed to set TCP_NODELAY");
    }
    let mut framed = Framed::new(stream, WireCodec::new());

    while let Some(item) = framed.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, error = %e, "dropping connection");
                break;
            }
        };

        let reply = match frame.to_request() {
            Ok(request) => service.call(request).await,
            Err(e) => {
                warn!(%peer, id = frame.id, error = %e, "rejecting malformed request");
                Reply::error(&ProxyError::from(e))
            }
        };

        let response = match Frame::response(frame.id, frame.method, &reply) {
            Ok(response) => response,
            Err(e) => {
                // The call still gets an answer; the link stays usable.
                warn!(%peer, id = frame.id, error = %e, "reply cannot be encoded");
                let failure = Reply::error(&ProxyError::from(e));
                match Frame::response(frame.id, frame.method, &failure) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(%peer, id = frame.id, error = %e, "failed to encode error reply");
                        break;
                    }
                }
            }
        };
        if let Err(e) = framed.send(response).await {
            warn!(%peer, error = %e, "write failed");
            break;
        }
    }
    debug!(%peer, "connection closed");
}
