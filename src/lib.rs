//! Maelstrom workload node.
//!
//! A single-process runtime speaking Maelstrom's line-delimited JSON protocol
//! on stdin/stdout, plus the workloads built on it:
//! - `broadcast`: gossip with dedup over a per-node neighbor list
//! - `counter`: grow-only counter over a KV service's compare-and-swap
//! - `unique-ids`: coordination-free id generation

pub mod config;
pub mod error;
pub mod kv;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod workloads;

pub use config::{NodeConfig, Workload};
pub use error::{error_code, NodeError, NodeResult};
pub use kv::KvClient;
pub use node::{Handler, Node, NodeBuilder, NodeIdentity, NodeOptions};
