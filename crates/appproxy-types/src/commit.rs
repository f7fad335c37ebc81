//! The application's answer to a committed block.

use crate::internal::InternalTransactionReceipt;
use crate::StateHash;
use serde::{Deserialize, Serialize};

/// State hash after applying a block plus one receipt per internal transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    /// Opaque application state fingerprint.
    #[serde(with = "crate::encoding::base64_bytes")]
    pub state_hash: StateHash,

    /// Receipts in the same order as the block's internal transactions.
    #[serde(default)]
    pub internal_transaction_receipts: Vec<InternalTransactionReceipt>,
}

impl CommitResponse {
    /// Creates a new commit response.
    pub fn new(
        state_hash: impl Into<StateHash>,
        internal_transaction_receipts: Vec<InternalTransactionReceipt>,
    ) -> Self {
        Self {
            state_hash: state_hash.into(),
            internal_transaction_receipts,
        }
    }

    /// Returns the state hash as hex, for logging.
    pub fn state_hash_hex(&self) -> String {
        hex::encode(&self.state_hash)
    }
}
