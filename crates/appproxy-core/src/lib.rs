//! appproxy core
//!
//! The boundary between an order-producing consensus engine and the
//! application consuming its transaction log.
//!
//! # Components
//!
//! - [`AppProxy`]: what the engine calls (commit, state change, snapshot,
//!   restore) plus the ingress queue it drains
//! - [`ProxyHandler`]: what the application implements
//! - [`InmemProxy`]: in-process variant, handlers are awaited directly
//! - [`CommitDriver`]: engine-side sequencing and receipt checks
//! - [`Idempotent`]: application-side replay of redelivered blocks
//! - [`submit_channel`]: the unbounded transaction ingress queue
//!
//! The socket variant lives in `appproxy-socket` and reuses [`Dispatcher`]
//! so that a handler behaves the same on both sides of a process boundary.
//!
//! # Flow
//!
//! ```text
//! application ──submit_tx──▶ ingress queue ──▶ engine (external)
//!                                                   │
//!                                                   ▼
//! application ◀──handler── AppProxy ◀──── CommitDriver
//! ```

mod config;
mod dispatch;
mod driver;
mod error;
mod handler;
mod idempotent;
mod inmem;
mod ingress;
mod metrics;
mod proxy;

pub use config::{ProxyConfig, RetryConfig, SocketConfig};
pub use dispatch::Dispatcher;
pub use driver::CommitDriver;
pub use error::{ErrorKind, ProxyError, Result};
pub use handler::ProxyHandler;
pub use idempotent::{Idempotent, DEFAULT_RETAINED_RESPONSES};
pub use inmem::InmemProxy;
pub use ingress::{submit_channel, SubmitReceiver, SubmitSender};
pub use metrics::{CallLabels, MethodLabels, ProxyMetrics};
pub use proxy::AppProxy;

pub use appproxy_types as types;
