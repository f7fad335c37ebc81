//! Engine operating modes.

use serde::{Deserialize, Serialize};

/// The consensus engine's operating mode, delivered as discrete notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Participating in consensus.
    Babbling,
    /// Fetching missing history from peers.
    CatchingUp,
    /// Requesting admission to the peer set.
    Joining,
    /// Requesting removal from the peer set.
    Leaving,
    /// Stopped for good.
    Shutdown,
    /// Paused, no longer creating events.
    Suspended,
}

impl NodeState {
    /// All states, in declaration order.
    pub const ALL: [NodeState; 6] = [
        NodeState::Babbling,
        NodeState::CatchingUp,
        NodeState::Joining,
        NodeState::Leaving,
        NodeState::Shutdown,
        NodeState::Suspended,
    ];

    /// Returns the state name used in logs and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Babbling => "babbling",
            NodeState::CatchingUp => "catching_up",
            NodeState::Joining => "joining",
            NodeState::Leaving => "leaving",
            NodeState::Shutdown => "shutdown",
            NodeState::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
