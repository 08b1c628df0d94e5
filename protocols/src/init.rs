//! Init handshake payloads.

use serde::{Deserialize, Serialize};

/// Sent once by the harness before any other request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitPayload {
    Init {
        /// Identity assigned to the receiving node
        node_id: String,
        /// Every node in the cluster, including the receiver, in cluster order
        node_ids: Vec<String>,
    },
    InitOk,
}
