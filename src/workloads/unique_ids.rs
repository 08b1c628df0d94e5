//! Unique id generation. Ids need no coordination: each embeds the node id, a
//! per-node sequence number, a timestamp and a random suffix.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use maelstrom_protocol::{unique_ids::GeneratePayload, Message, RpcError};

use crate::{
    error::NodeResult,
    node::{Handler, Node, NodeBuilder},
};

pub const KINDS: [&str; 1] = ["generate"];

#[derive(Debug, Default)]
pub struct UniqueIdHandler {
    next_seq: AtomicU64,
}

impl UniqueIdHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, builder: NodeBuilder) -> NodeResult<NodeBuilder> {
        let handler: Arc<dyn Handler> = Arc::new(self);
        KINDS
            .iter()
            .try_fold(builder, |builder, kind| builder.handle_shared(*kind, handler.clone()))
    }

    /// `<node_id>_<seq>_<unix_nanos>_<16 hex digits>`
    pub fn generate(&self, node_id: &str) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let suffix: u64 = rand::random();
        format!("{}_{}_{}_{:016x}", node_id, seq, nanos, suffix)
    }
}

#[async_trait]
impl Handler for UniqueIdHandler {
    async fn handle(&self, node: Node, msg: Message) -> NodeResult<()> {
        match msg.payload::<GeneratePayload>()? {
            GeneratePayload::Generate => {
                let id = self.generate(node.id()?);
                node.reply(&msg, &GeneratePayload::GenerateOk { id }).await
            }
            GeneratePayload::GenerateOk { .. } => {
                Err(RpcError::not_supported("generate_ok is not a request").into())
            }
        }
    }
}
