//! Proxy error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The protocol-level classification of a proxy failure.
///
/// This is what crosses the wire when a remote handler fails, so both halves
/// of the socket bridge agree on how to treat the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The application failed to apply a block or restore state.
    Application,
    /// The connection was lost or the call timed out.
    TransportUnavailable,
    /// A malformed or out-of-order message.
    ProtocolViolation,
    /// Snapshot or restore is not implemented.
    Unsupported,
}

impl ErrorKind {
    /// Returns the kind name used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Application => "application",
            ErrorKind::TransportUnavailable => "transport_unavailable",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while driving the application through a proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A handler returned a failure or panicked.
    #[error("application error: {0}")]
    Application(String),

    /// Connection lost or call timed out.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Malformed or out-of-order message.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Operation not implemented by the application.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProxyError {
    /// Creates an application error.
    pub fn application(msg: impl Into<String>) -> Self {
        ProxyError::Application(msg.into())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        ProxyError::TransportUnavailable(msg.into())
    }

    /// Creates a protocol violation.
    pub fn protocol(msg: impl Into<String>) -> Self {
        ProxyError::ProtocolViolation(msg.into())
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        ProxyError::Unsupported(msg.into())
    }

    /// Rebuilds an error from its wire representation.
    pub fn from_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::Application => ProxyError::Application(msg),
            ErrorKind::TransportUnavailable => ProxyError::TransportUnavailable(msg),
            ErrorKind::ProtocolViolation => ProxyError::ProtocolViolation(msg),
            ErrorKind::Unsupported => ProxyError::Unsupported(msg),
        }
    }

    /// Returns the protocol classification. Configuration errors never reach
    /// the protocol and are reported as application errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Application(_) | ProxyError::Config(_) => ErrorKind::Application,
            ProxyError::TransportUnavailable(_) => ErrorKind::TransportUnavailable,
            ProxyError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            ProxyError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Returns the bare message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ProxyError::Application(m)
            | ProxyError::TransportUnavailable(m)
            | ProxyError::ProtocolViolation(m)
            | ProxyError::Unsupported(m)
            | ProxyError::Config(m) => m,
        }
    }

    /// True if the transport may succeed on a later attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ProxyError::TransportUnavailable(_))
    }

    /// True if the error means fast-sync is unavailable rather than broken.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProxyError::Unsupported(_))
    }
}

/// A specialized Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
