//! Grow-only counter backed by a KV service.

use std::sync::Arc;

use async_trait::async_trait;
use maelstrom_mesh::{CasRetryPolicy, GCounter};
use maelstrom_protocol::{counter::CounterPayload, kv::LIN_KV, Message, RpcError};
use tracing::debug;

use crate::{
    error::NodeResult,
    kv::KvClient,
    node::{Handler, Node, NodeBuilder},
};

/// Message types served by [`CounterHandler`].
pub const KINDS: [&str; 2] = ["add", "read"];

#[derive(Debug, Clone)]
pub struct CounterHandler {
    kv_service: String,
    retry: CasRetryPolicy,
}

impl Default for CounterHandler {
    fn default() -> Self {
        Self::new(LIN_KV)
    }
}

impl CounterHandler {
    pub fn new(kv_service: impl Into<String>) -> Self {
        Self {
            kv_service: kv_service.into(),
            retry: CasRetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: CasRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn register(self, builder: NodeBuilder) -> NodeResult<NodeBuilder> {
        let handler: Arc<dyn Handler> = Arc::new(self);
        KINDS
            .iter()
            .try_fold(builder, |builder, kind| builder.handle_shared(*kind, handler.clone()))
    }

    fn counter(&self, node: &Node) -> NodeResult<GCounter<KvClient>> {
        let store = KvClient::new(node.clone(), self.kv_service.as_str());
        Ok(GCounter::new(store, node.id()?).with_retry_policy(self.retry.clone()))
    }
}

#[async_trait]
impl Handler for CounterHandler {
    async fn handle(&self, node: Node, msg: Message) -> NodeResult<()> {
        match msg.payload::<CounterPayload>()? {
            CounterPayload::Add { delta } => {
                let committed = self.counter(&node)?.add(delta).await?;
                debug!(delta, committed, "Counter add applied");
                node.reply(&msg, &CounterPayload::AddOk).await
            }
            CounterPayload::Read => {
                let value = self.counter(&node)?.read(node.peer_ids()?).await?;
                node.reply(&msg, &CounterPayload::ReadOk { value }).await
            }
            CounterPayload::AddOk | CounterPayload::ReadOk { .. } => Err(RpcError::not_supported(
                format!("{} is not a request", msg.kind()),
            )
            .into()),
        }
    }
}
