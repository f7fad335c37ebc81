//! Calling side of a socket link.
//!
//! [`RpcClient`] keeps at most one connection to its peer. The connection is
//! dialed lazily on the first call and redialed with backoff after it drops.
//! Calls are multiplexed over the connection by correlation id, and each call
//! is bounded by the configured timeout.

use crate::retry::Backoff;
use crate::wire::{Frame, FrameKind, Reply, Request, WireCodec};
use appproxy_core::{ProxyError, Result, SocketConfig};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>;

/// A live connection and its reader/writer tasks.
struct Connection {
    outbound: mpsc::UnboundedSender<Frame>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    tasks: [JoinHandle<()>; 2],
}

impl Connection {
    fn spawn(stream: TcpStream, peer: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        let (mut sink, mut frames) = Framed::new(stream, WireCodec::new()).split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<Frame>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = {
            let closed = closed.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                while let Some(frame) = queue.recv().await {
                    if let Err(e) = sink.send(frame).await {
                        warn!(%peer, error = %e, "write failed");
                        break;
                    }
                }
                closed.store(true, Ordering::SeqCst);
                pending.lock().clear();
            })
        };

        let reader = {
            let closed = closed.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                while let Some(item) = frames.next().await {
                    match item {
                        Ok(frame) if frame.kind == FrameKind::Response => {
                            let waiter = pending.lock().remove(&frame.id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(frame);
                                }
                                None => debug!(%peer, id = frame.id, "reply for abandoned call"),
                            }
                        }
                        Ok(frame) => {
                            warn!(%peer, method = %frame.method, "peer sent a request on a calling link");
                            break;
                        }
                        Err(e) => {
                            warn!(%peer, error = %e, "read failed");
                            break;
                        }
                    }
                }
                closed.store(true, Ordering::SeqCst);
                // Dropping the senders fails every call still in flight.
                pending.lock().clear();
                debug!(%peer, "connection closed");
            })
        };

        Self {
            outbound,
            pending,
            closed,
            tasks: [writer, reader],
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.outbound.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Removes a call's waiter when the call finishes or is cancelled.
struct PendingGuard {
    pending: Pending,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Request/response client for one peer address.
pub struct RpcClient {
    peer: SocketAddr,
    timeout: Duration,
    connect_timeout: Duration,
    backoff: Backoff,
    next_id: AtomicU64,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl RpcClient {
    /// Creates a client for `peer`. No connection is made until the first call.
    pub fn new(
        peer: SocketAddr,
        timeout: Duration,
        connect_timeout: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            peer,
            timeout,
            connect_timeout,
            backoff,
            next_id: AtomicU64::new(1),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Creates a client dialing `config.client_addr`.
    pub fn from_config(config: &SocketConfig) -> Self {
        Self::new(
            config.client_addr,
            config.timeout(),
            config.connect_timeout(),
            Backoff::from(&config.retry),
        )
    }

    /// Address of the peer.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True if a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        matches!(self.conn.lock().await.as_ref(), Some(c) if !c.is_closed())
    }

    /// Sends a request and waits for its reply.
    ///
    /// Remote errors come back as `Err` with their original kind. A timeout,
    /// a refused connection, or a connection lost mid-call is
    /// `TransportUnavailable`.
    pub async fn call(&self, request: Request) -> Result<Reply> {
        let method = request.method();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::request(id, &request)?;

        let reply = match tokio::time::timeout(self.timeout, self.exchange(frame)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    peer = %self.peer,
                    %method,
                    id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "call timed out"
                );
                return Err(ProxyError::transport(format!(
                    "{method} to {} timed out after {:?}",
                    self.peer, self.timeout
                )));
            }
        };
        reply.into_result()
    }

    async fn exchange(&self, frame: Frame) -> Result<Reply> {
        let method = frame.method;
        let id = frame.id;
        let (outbound, pending) = self.connection().await?;

        let (tx, rx) = oneshot::channel();
        pending.lock().insert(id, tx);
        let _guard = PendingGuard { pending, id };

        outbound
            .send(frame)
            .map_err(|_| ProxyError::transport(format!("connection to {} closed", self.peer)))?;

        let response = rx.await.map_err(|_| {
            ProxyError::transport(format!(
                "connection to {} lost before {method} completed",
                self.peer
            ))
        })?;
        Ok(response.to_reply(method)?)
    }

    /// Returns handles to a live connection, dialing one if needed.
    async fn connection(&self) -> Result<(mpsc::UnboundedSender<Frame>, Pending)> {
        let mut conn = self.conn.lock().await;
        if let Some(c) = conn.as_ref() {
            if !c.is_closed() {
                return Ok((c.outbound.clone(), c.pending.clone()));
            }
            info!(peer = %self.peer, "connection lost, reconnecting");
        }
        *conn = None;

        let peer = self.peer;
        let connect_timeout = self.connect_timeout;
        let stream = self
            .backoff
            .retry(&peer.to_string(), || dial(peer, connect_timeout))
            .await?;
        debug!(%peer, "connected");

        let fresh = Connection::spawn(stream, peer);
        let handles = (fresh.outbound.clone(), fresh.pending.clone());
        *conn = Some(fresh);
        Ok(handles)
    }

    /// Drops the current connection, if any.
    pub async fn disconnect(&self) {
        self.conn.lock().await.take();
    }
}

async fn dial(peer: SocketAddr, connect_timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(connect_timeout, TcpStream::connect(peer)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProxyError::transport(format!("connect to {peer} failed: {e}"))),
        Err(_) => Err(ProxyError::transport(format!(
            "connect to {peer} timed out after {connect_timeout:?}"
        ))),
    }
}
