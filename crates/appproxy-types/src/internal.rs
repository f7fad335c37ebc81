//! Internal transactions: membership changes carried inside blocks.

use crate::peer::Peer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The membership action an internal transaction proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Add the subject to the peer set.
    PeerAdd,
    /// Remove the subject from the peer set.
    PeerRemove,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::PeerAdd => write!(f, "peer_add"),
            TransactionType::PeerRemove => write!(f, "peer_remove"),
        }
    }
}

/// The signed part of an internal transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransactionBody {
    /// Proposed action.
    #[serde(rename = "type")]
    pub kind: TransactionType,

    /// The participant the action applies to.
    pub peer: Peer,
}

/// A request to add or remove a participant from the active peer set.
///
/// Produced by the consensus engine, never by the ingress queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransaction {
    /// The request.
    pub body: InternalTransactionBody,

    /// Opaque signature over the body, produced and checked by the engine.
    #[serde(default)]
    pub signature: String,
}

impl InternalTransaction {
    /// Creates an unsigned internal transaction.
    pub fn new(kind: TransactionType, peer: Peer) -> Self {
        Self {
            body: InternalTransactionBody { kind, peer },
            signature: String::new(),
        }
    }

    /// Returns the proposed action.
    pub fn kind(&self) -> TransactionType {
        self.body.kind
    }

    /// Returns the subject of the request.
    pub fn peer(&self) -> &Peer {
        &self.body.peer
    }

    /// SHA-256 of the JSON-encoded body.
    pub fn hash(&self) -> [u8; 32] {
        let bytes = serde_json::to_vec(&self.body)
            .expect("internal transaction serialization should not fail");
        Sha256::digest(&bytes).into()
    }

    /// Builds a receipt accepting this request.
    pub fn as_accepted(&self) -> InternalTransactionReceipt {
        InternalTransactionReceipt {
            internal_transaction: self.clone(),
            accepted: true,
        }
    }

    /// Builds a receipt refusing this request.
    pub fn as_refused(&self) -> InternalTransactionReceipt {
        InternalTransactionReceipt {
            internal_transaction: self.clone(),
            accepted: false,
        }
    }
}

/// The application's verdict on one [`InternalTransaction`].
///
/// Every correct peer must produce the same receipt for the same request in
/// the same block, otherwise the peer sets diverge. The proxy layer cannot
/// check this and only carries the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransactionReceipt {
    /// The request this receipt answers.
    pub internal_transaction: InternalTransaction,

    /// Whether the request was accepted.
    pub accepted: bool,
}
