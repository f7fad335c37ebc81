//! appproxy dummy application
//!
//! A minimal application used to exercise the bridge end to end. Its state
//! is a SHA-256 chain over committed transactions; see [`DummyState`].

pub mod logging;
mod state;

pub use state::{DummyState, DEFAULT_RETAINED_SNAPSHOTS};
