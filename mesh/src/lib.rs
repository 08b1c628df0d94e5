//! Mesh State for Maelstrom Nodes
//!
//! This crate holds the distributed-protocol state that sits behind a node's
//! message handlers, independent of the transport:
//! - Gossip broadcast state: dedup set, accepted-value log, neighbor topology
//! - Compare-and-swap store seam and an in-memory linearizable store
//! - Grow-only counter replicated through per-node CAS keys

pub mod counter;
pub mod gossip;
pub mod kv_store;
pub mod store;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use counter::{counter_key, CasRetryPolicy, GCounter};
pub use gossip::{neighbors_for, Acceptance, GossipState};
pub use kv_store::KvStore;
pub use store::{CasStore, StoreError, StoreResult};
