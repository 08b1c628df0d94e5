//! Client for Maelstrom's key-value services (`lin-kv`, `seq-kv`, `lww-kv`).

use std::time::Duration;

use async_trait::async_trait;
use maelstrom_mesh::{CasStore, StoreError, StoreResult};
use maelstrom_protocol::{kv::KvPayload, ErrorCode, Message, RpcError};
use serde_json::Value;
use tracing::debug;

use crate::{error::NodeError, node::Node};

/// Integer key-value access to a KV service through a node's RPC layer.
///
/// Every request is bounded by `timeout`; a timed out request is reported as
/// an RPC error with code `timeout`, which may or may not have taken effect.
#[derive(Debug, Clone)]
pub struct KvClient {
    node: Node,
    service: String,
    timeout: Duration,
}

impl KvClient {
    pub fn new(node: Node, service: impl Into<String>) -> Self {
        let timeout = node.options().rpc_timeout;
        Self {
            node,
            service: service.into(),
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Read any JSON value stored under `key`.
    pub async fn read_value(&self, key: &str) -> StoreResult<Option<Value>> {
        let request = KvPayload::Read {
            key: Value::from(key),
        };
        match self.request(key, &request).await {
            Ok(reply) => match reply.payload::<KvPayload>()? {
                KvPayload::ReadOk { value } => Ok(Some(value)),
                _ => Err(unexpected_reply(&reply)),
            },
            Err(StoreError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write_value(&self, key: &str, value: Value) -> StoreResult<()> {
        let request = KvPayload::Write {
            key: Value::from(key),
            value,
        };
        let reply = self.request(key, &request).await?;
        match reply.payload::<KvPayload>()? {
            KvPayload::WriteOk => Ok(()),
            _ => Err(unexpected_reply(&reply)),
        }
    }

    async fn request(&self, key: &str, request: &KvPayload) -> StoreResult<Message> {
        self.node
            .call_with_timeout(&self.service, request, self.timeout)
            .await
            .map_err(|e| {
                debug!(service = %self.service, key, error = %e, "KV request failed");
                classify(e, key, request)
            })
    }
}

/// Map a failed KV call onto the store's error vocabulary.
fn classify(err: NodeError, key: &str, request: &KvPayload) -> StoreError {
    match err {
        NodeError::Rpc(rpc) => match rpc.code {
            ErrorCode::KeyDoesNotExist => StoreError::KeyNotFound(key.to_string()),
            ErrorCode::PreconditionFailed => {
                let expected = match request {
                    KvPayload::Cas { from, .. } => from.as_i64().unwrap_or_default(),
                    _ => 0,
                };
                StoreError::PreconditionFailed {
                    key: key.to_string(),
                    expected,
                    actual: None,
                }
            }
            _ => StoreError::Rpc(rpc),
        },
        NodeError::Store(store) => store,
        other => StoreError::Rpc(other.into_rpc_error()),
    }
}

fn unexpected_reply(reply: &Message) -> StoreError {
    StoreError::Rpc(RpcError::malformed_request(format!(
        "unexpected KV reply {}",
        reply.kind()
    )))
}

#[async_trait]
impl CasStore for KvClient {
    async fn read(&self, key: &str) -> StoreResult<Option<i64>> {
        match self.read_value(key).await? {
            None => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                StoreError::Rpc(RpcError::malformed_request(format!(
                    "{} holds a non-integer value {}",
                    key, value
                )))
            }),
        }
    }

    async fn write(&self, key: &str, value: i64) -> StoreResult<()> {
        self.write_value(key, Value::from(value)).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: i64,
        new: i64,
        create_if_missing: bool,
    ) -> StoreResult<()> {
        let request = KvPayload::Cas {
            key: Value::from(key),
            from: Value::from(expected),
            to: Value::from(new),
            create_if_not_exists: create_if_missing,
        };
        let reply = self.request(key, &request).await?;
        match reply.payload::<KvPayload>()? {
            KvPayload::CasOk => Ok(()),
            _ => Err(unexpected_reply(&reply)),
        }
    }
}
