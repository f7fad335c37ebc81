//! appproxy socket bridge
//!
//! Carries the [`AppProxy`](appproxy_core::AppProxy) contract across a
//! process boundary over TCP.
//!
//! ```text
//!  engine process                                 application process
//! ┌────────────────────┐   CommitBlock, ...    ┌──────────────────────┐
//! │ SocketAppProxy     │ ────────────────────▶ │ SocketAppClient      │
//! │   client → app     │                       │   server ← engine    │
//! │   server ← app     │ ◀──────────────────── │   client → engine    │
//! └────────────────────┘       SubmitTx        └──────────────────────┘
//! ```
//!
//! Each side listens on its `bind_addr` and dials the other side's address
//! (`client_addr`) lazily, reconnecting with backoff. Frames are described
//! in [`wire`].

mod app;
mod client;
mod engine;
mod retry;
mod server;
pub mod wire;

pub use app::SocketAppClient;
pub use client::RpcClient;
pub use engine::SocketAppProxy;
pub use retry::Backoff;
pub use server::{RpcServer, Service};
pub use wire::{Frame, Method, Reply, Request, WireCodec, WireError};

use appproxy_core::{AppProxy, InmemProxy, ProxyConfig, ProxyError, ProxyHandler, Result};
use std::sync::Arc;

/// Builds the engine-side proxy selected by `config`.
///
/// The in-process variant needs the application's handler; the socket
/// variant ignores it, since the handler lives in the other process.
pub async fn proxy_from_config<H: ProxyHandler + 'static>(
    config: &ProxyConfig,
    handler: Option<H>,
) -> Result<Arc<dyn AppProxy>> {
    config.validate()?;
    match config {
        ProxyConfig::Inmem => {
            let handler = handler.ok_or_else(|| {
                ProxyError::Config("the inmem proxy requires an application handler".into())
            })?;
            Ok(Arc::new(InmemProxy::new(handler)))
        }
        ProxyConfig::Socket(socket) => Ok(Arc::new(SocketAppProxy::bind(socket).await?)),
    }
}
