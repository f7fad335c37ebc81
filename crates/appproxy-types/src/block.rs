//! Committed blocks.
//!
//! A block is the unit the engine hands to the application: an ordered batch
//! of opaque transactions plus internal transactions, identified by a
//! monotonically increasing index.

use crate::internal::{InternalTransaction, InternalTransactionReceipt};
use crate::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// SHA-256 hash of a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Creates a block hash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a block hash from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The hashed content of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    /// Position of the block in the committed sequence.
    pub index: u64,

    /// Consensus round in which the block's events were decided.
    pub round_received: u64,

    /// Application state hash recorded by the engine, if known.
    #[serde(default, with = "crate::encoding::base64_bytes")]
    pub state_hash: Vec<u8>,

    /// Hash of the consensus frame the block was built from.
    #[serde(default, with = "crate::encoding::base64_bytes")]
    pub frame_hash: Vec<u8>,

    /// Hash of the peer set in force when the block was produced.
    #[serde(default, with = "crate::encoding::base64_bytes")]
    pub peers_hash: Vec<u8>,

    /// Ordered opaque transactions.
    #[serde(default, with = "crate::encoding::base64_list")]
    pub transactions: Vec<Transaction>,

    /// Ordered membership requests.
    #[serde(default)]
    pub internal_transactions: Vec<InternalTransaction>,

    /// Receipts recorded by the engine after a previous commit of this block.
    #[serde(default)]
    pub internal_transaction_receipts: Vec<InternalTransactionReceipt>,
}

/// An ordered batch of transactions and internal transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block content.
    pub body: BlockBody,

    /// Validator signatures keyed by validator public key hex.
    #[serde(default)]
    pub signatures: BTreeMap<String, String>,
}

impl Block {
    /// Creates a new unsigned block.
    pub fn new(
        index: u64,
        round_received: u64,
        frame_hash: Vec<u8>,
        peers_hash: Vec<u8>,
        transactions: Vec<Transaction>,
        internal_transactions: Vec<InternalTransaction>,
    ) -> Self {
        Self {
            body: BlockBody {
                index,
                round_received,
                state_hash: Vec::new(),
                frame_hash,
                peers_hash,
                transactions,
                internal_transactions,
                internal_transaction_receipts: Vec::new(),
            },
            signatures: BTreeMap::new(),
        }
    }

    /// Creates a block carrying only opaque transactions.
    pub fn with_transactions(index: u64, transactions: Vec<Transaction>) -> Self {
        Self::new(index, index, Vec::new(), Vec::new(), transactions, Vec::new())
    }

    /// Returns the block index.
    pub fn index(&self) -> u64 {
        self.body.index
    }

    /// Returns the round in which the block was decided.
    pub fn round_received(&self) -> u64 {
        self.body.round_received
    }

    /// Returns the ordered transactions.
    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    /// Returns the ordered internal transactions.
    pub fn internal_transactions(&self) -> &[InternalTransaction] {
        &self.body.internal_transactions
    }

    /// Returns the number of opaque transactions.
    pub fn tx_count(&self) -> usize {
        self.body.transactions.len()
    }

    /// Computes the block hash over the body.
    pub fn hash(&self) -> BlockHash {
        let bytes = serde_json::to_vec(&self.body).expect("block serialization should not fail");
        BlockHash(Sha256::digest(&bytes).into())
    }

    /// Attaches a validator signature.
    pub fn set_signature(&mut self, validator: impl Into<String>, signature: impl Into<String>) {
        self.signatures.insert(validator.into(), signature.into());
    }
}
