//! Wire format of the socket bridge.
//!
//! Every message is a frame:
//!
//! ```text
//! +-------+---------+------+--------+----------------+-------------+---------+
//! | magic | version | kind | method | correlation id | payload len | payload |
//! |  4 B  |   1 B   | 1 B  |  1 B   |  8 B (BE u64)  | 4 B (BE u32)|  N B    |
//! +-------+---------+------+--------+----------------+-------------+---------+
//! ```
//!
//! The payload is the JSON encoding of a [`Request`] or a [`Reply`], with
//! byte strings in base64. A reply carries the correlation id and method of
//! the request it answers. Payloads above [`MAX_PAYLOAD_SIZE`] are refused
//! when the frame is built, before anything reaches the socket.

use appproxy_core::{ErrorKind, ProxyError};
use appproxy_types::encoding::base64_bytes;
use appproxy_types::{Block, CommitResponse, NodeState};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Magic bytes identifying appproxy frames.
pub const MAGIC: [u8; 4] = *b"APXY";

/// Current wire version.
pub const WIRE_VERSION: u8 = 1;

/// Maximum payload size in bytes (16 MB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 4 + 1 + 1 + 1 + 8 + 4;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Unsupported wire version.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown frame kind.
    #[error("unknown frame kind: {0}")]
    UnknownKind(u8),

    /// Unknown method identifier.
    #[error("unknown method: {0}")]
    UnknownMethod(u8),

    /// The payload exceeds size limits.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// The actual size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// The payload is not valid JSON for its frame.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Header and payload disagree, or a reply does not fit its request.
    #[error("mismatch: {0}")]
    Mismatch(String),
}

impl From<WireError> for ProxyError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => ProxyError::transport(e.to_string()),
            other => ProxyError::protocol(other.to_string()),
        }
    }
}

/// Whether a frame asks or answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A call.
    Request = 0,
    /// The answer to a call.
    Response = 1,
}

impl FrameKind {
    /// Parses a frame kind from a byte.
    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            0 => Ok(FrameKind::Request),
            1 => Ok(FrameKind::Response),
            _ => Err(WireError::UnknownKind(b)),
        }
    }
}

/// The fixed method surface of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    /// Engine → application: apply a block.
    CommitBlock = 1,
    /// Engine → application: node state changed.
    StateChanged = 2,
    /// Engine → application: produce a snapshot.
    GetSnapshot = 3,
    /// Engine → application: restore from a snapshot.
    Restore = 4,
    /// Application → engine: enqueue a transaction.
    SubmitTx = 5,
}

impl Method {
    /// Parses a method from a byte.
    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            1 => Ok(Method::CommitBlock),
            2 => Ok(Method::StateChanged),
            3 => Ok(Method::GetSnapshot),
            4 => Ok(Method::Restore),
            5 => Ok(Method::SubmitTx),
            _ => Err(WireError::UnknownMethod(b)),
        }
    }

    /// Returns the method name used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CommitBlock => "commit_block",
            Method::StateChanged => "state_changed",
            Method::GetSnapshot => "get_snapshot",
            Method::Restore => "restore",
            Method::SubmitTx => "submit_tx",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call carried by a request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    /// Apply a block.
    CommitBlock(Block),
    /// Observe a state change.
    StateChanged(NodeState),
    /// Produce a snapshot.
    GetSnapshot {
        /// Block index the snapshot must reflect.
        block_index: u64,
    },
    /// Restore from a snapshot.
    Restore {
        /// Snapshot bytes.
        #[serde(with = "base64_bytes")]
        snapshot: Vec<u8>,
    },
    /// Enqueue a transaction.
    SubmitTx {
        /// Opaque transaction bytes.
        #[serde(with = "base64_bytes")]
        tx: Vec<u8>,
    },
}

impl Request {
    /// Returns the method this request invokes.
    pub fn method(&self) -> Method {
        match self {
            Request::CommitBlock(_) => Method::CommitBlock,
            Request::StateChanged(_) => Method::StateChanged,
            Request::GetSnapshot { .. } => Method::GetSnapshot,
            Request::Restore { .. } => Method::Restore,
            Request::SubmitTx { .. } => Method::SubmitTx,
        }
    }
}

/// The outcome carried by a response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Reply {
    /// Answer to `CommitBlock`.
    Committed(CommitResponse),
    /// Answer to `StateChanged` and `SubmitTx`.
    Ack,
    /// Answer to `GetSnapshot`.
    Snapshot(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Answer to `Restore`.
    StateHash(#[serde(with = "base64_bytes")] Vec<u8>),
    /// The call failed on the remote side.
    Error {
        /// Protocol classification.
        kind: ErrorKind,
        /// Human readable reason.
        message: String,
    },
}

impl Reply {
    /// Builds an error reply.
    pub fn error(err: &ProxyError) -> Self {
        Reply::Error {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }

    /// Builds a reply from a handler outcome.
    pub fn from_result<T>(result: Result<T, ProxyError>, ok: impl FnOnce(T) -> Reply) -> Self {
        match result {
            Ok(value) => ok(value),
            Err(e) => Reply::error(&e),
        }
    }

    /// True if this reply is a valid answer to `method`.
    pub fn answers(&self, method: Method) -> bool {
        matches!(
            (self, method),
            (Reply::Error { .. }, _)
                | (Reply::Committed(_), Method::CommitBlock)
                | (Reply::Ack, Method::StateChanged)
                | (Reply::Ack, Method::SubmitTx)
                | (Reply::Snapshot(_), Method::GetSnapshot)
                | (Reply::StateHash(_), Method::Restore)
        )
    }

    /// Turns an error reply back into a [`ProxyError`].
    pub fn into_result(self) -> Result<Reply, ProxyError> {
        match self {
            Reply::Error { kind, message } => Err(ProxyError::from_kind(kind, message)),
            other => Ok(other),
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            Reply::Committed(_) => "committed",
            Reply::Ack => "ack",
            Reply::Snapshot(_) => "snapshot",
            Reply::StateHash(_) => "state_hash",
            Reply::Error { .. } => "error",
        }
    }
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request or response.
    pub kind: FrameKind,
    /// Method invoked or answered.
    pub method: Method,
    /// Correlation id chosen by the caller.
    pub id: u64,
    /// JSON payload.
    pub payload: Bytes,
}

impl Frame {
    /// Builds a request frame.
    pub fn request(id: u64, request: &Request) -> Result<Self, WireError> {
        Ok(Self {
            kind: FrameKind::Request,
            method: request.method(),
            id,
            payload: encode_payload(request)?,
        })
    }

    /// Builds the response frame for request `id`.
    pub fn response(id: u64, method: Method, reply: &Reply) -> Result<Self, WireError> {
        Ok(Self {
            kind: FrameKind::Response,
            method,
            id,
            payload: encode_payload(reply)?,
        })
    }

    /// Decodes the payload of a request frame.
    pub fn to_request(&self) -> Result<Request, WireError> {
        if self.kind != FrameKind::Request {
            return Err(WireError::Mismatch(format!(
                "expected a request, got a response to {}",
                self.method
            )));
        }
        let request: Request = serde_json::from_slice(&self.payload)?;
        if request.method() != self.method {
            return Err(WireError::Mismatch(format!(
                "header says {} but payload is {}",
                self.method,
                request.method()
            )));
        }
        Ok(request)
    }

    /// Decodes the payload of a response frame answering `method`.
    pub fn to_reply(&self, method: Method) -> Result<Reply, WireError> {
        if self.kind != FrameKind::Response {
            return Err(WireError::Mismatch(format!(
                "expected a response, got a {} request",
                self.method
            )));
        }
        if self.method != method {
            return Err(WireError::Mismatch(format!(
                "response {} answers {} instead of {}",
                self.id, self.method, method
            )));
        }
        let reply: Reply = serde_json::from_slice(&self.payload)?;
        if !reply.answers(method) {
            return Err(WireError::Mismatch(format!(
                "{} reply does not answer {}",
                reply.variant(),
                method
            )));
        }
        Ok(reply)
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Bytes, WireError> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::TooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(Bytes::from(payload))
}

/// Length-prefixed frame codec.
#[derive(Debug, Clone)]
pub struct WireCodec {
    max_payload: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl WireCodec {
    /// Creates a codec with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Creates a codec with a custom payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let mut magic = [0u8; 4];
        header.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(WireError::InvalidMagic);
        }
        let version = header.get_u8();
        if version != WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let kind = FrameKind::from_byte(header.get_u8())?;
        let method = Method::from_byte(header.get_u8())?;
        let id = header.get_u64();
        let len = header.get_u32() as usize;
        if len > self.max_payload {
            return Err(WireError::TooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame {
            kind,
            method,
            id,
            payload,
        }))
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = WireError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WireError> {
        if frame.payload.len() > self.max_payload {
            return Err(WireError::TooLarge {
                size: frame.payload.len(),
                max: self.max_payload,
            });
        }
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_slice(&MAGIC);
        dst.put_u8(WIRE_VERSION);
        dst.put_u8(frame.kind as u8);
        dst.put_u8(frame.method as u8);
        dst.put_u64(frame.id);
        dst.put_u32(frame.payload.len() as u32);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
