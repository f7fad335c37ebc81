//! Participant identity.

use serde::{Deserialize, Serialize};

/// A participant of the active peer set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Hex-encoded public key.
    pub pub_key_hex: String,

    /// Network address the peer listens on.
    pub net_addr: String,

    /// Human readable name.
    #[serde(default)]
    pub moniker: String,
}

impl Peer {
    /// Creates a new peer.
    pub fn new(
        pub_key_hex: impl Into<String>,
        net_addr: impl Into<String>,
        moniker: impl Into<String>,
    ) -> Self {
        Self {
            pub_key_hex: pub_key_hex.into(),
            net_addr: net_addr.into(),
            moniker: moniker.into(),
        }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.moniker.is_empty() {
            write!(f, "{}@{}", self.pub_key_hex, self.net_addr)
        } else {
            write!(f, "{}({})@{}", self.moniker, self.pub_key_hex, self.net_addr)
        }
    }
}
