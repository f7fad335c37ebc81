//! Common types exchanged across the `appproxy` boundary.
//!
//! A consensus engine hands ordered [`Block`]s to an application and gets a
//! [`CommitResponse`] back. Transactions are opaque byte strings; the only
//! structured payload the boundary understands is the [`InternalTransaction`],
//! a membership change that the application accepts or refuses with an
//! [`InternalTransactionReceipt`].

mod block;
mod commit;
pub mod encoding;
mod internal;
mod peer;
mod state;

pub use block::{Block, BlockBody, BlockHash};
pub use commit::CommitResponse;
pub use internal::{
    InternalTransaction, InternalTransactionBody, InternalTransactionReceipt, TransactionType,
};
pub use peer::Peer;
pub use state::NodeState;

/// An opaque transaction. Nothing in this workspace interprets its contents.
pub type Transaction = Vec<u8>;

/// Opaque application state as of some block index.
pub type Snapshot = Vec<u8>;

/// Opaque fingerprint of application state after applying a block.
pub type StateHash = Vec<u8>;
