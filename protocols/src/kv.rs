//! Payloads understood by Maelstrom's built-in key-value services.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequentially consistent store.
pub const SEQ_KV: &str = "seq-kv";
/// Linearizable store.
pub const LIN_KV: &str = "lin-kv";
/// Last-write-wins store.
pub const LWW_KV: &str = "lww-kv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KvPayload {
    Read {
        key: Value,
    },
    ReadOk {
        value: Value,
    },
    Write {
        key: Value,
        value: Value,
    },
    WriteOk,
    /// Set `key` to `to` only if it currently holds `from`
    Cas {
        key: Value,
        from: Value,
        to: Value,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        create_if_not_exists: bool,
    },
    CasOk,
}
