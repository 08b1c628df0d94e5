//! Gossip broadcast: accept, dedup and forward values to neighbors.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use maelstrom_mesh::{neighbors_for, Acceptance, GossipState};
use maelstrom_protocol::{
    broadcast::{BroadcastPayload, BroadcastValue},
    Message, RpcError,
};
use tracing::{debug, warn};

use crate::{
    error::NodeResult,
    node::{Handler, Node, NodeBuilder},
};

/// Message types served by [`BroadcastHandler`].
pub const KINDS: [&str; 3] = ["broadcast", "read", "topology"];

#[derive(Debug, Clone, Default)]
pub struct BroadcastHandler {
    gossip: Arc<GossipState<BroadcastValue>>,
}

impl BroadcastHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gossip(&self) -> &GossipState<BroadcastValue> {
        &self.gossip
    }

    pub fn register(self, builder: NodeBuilder) -> NodeResult<NodeBuilder> {
        let handler: Arc<dyn Handler> = Arc::new(self);
        KINDS
            .iter()
            .try_fold(builder, |builder, kind| builder.handle_shared(*kind, handler.clone()))
    }

    /// Forward `value` to every neighbor, concurrently and without waiting for
    /// acknowledgements. A failed send is logged and skipped.
    async fn fan_out(&self, node: &Node, value: BroadcastValue, neighbors: Vec<String>) {
        if neighbors.is_empty() {
            return;
        }
        let body = BroadcastPayload::Broadcast { message: value };
        let body = &body;
        let sends = neighbors.iter().map(|neighbor| async move {
            if let Err(e) = node.send(neighbor, body).await {
                warn!(neighbor = %neighbor, error = %e, "Failed to forward broadcast");
            }
        });
        join_all(sends).await;
    }
}

#[async_trait]
impl Handler for BroadcastHandler {
    async fn handle(&self, node: Node, msg: Message) -> NodeResult<()> {
        match msg.payload::<BroadcastPayload>()? {
            BroadcastPayload::Broadcast { message } => {
                let acceptance = self.gossip.accept(message.clone());
                node.reply(&msg, &BroadcastPayload::BroadcastOk).await?;

                match acceptance {
                    Acceptance::Fresh { neighbors } => {
                        debug!(value = %message, ?neighbors, "Accepted new value");
                        self.fan_out(&node, message, neighbors).await;
                    }
                    Acceptance::Duplicate => {
                        debug!(value = %message, src = %msg.src, "Ignoring duplicate value");
                    }
                }
                Ok(())
            }
            BroadcastPayload::Read => {
                let messages = self.gossip.snapshot();
                node.reply(&msg, &BroadcastPayload::ReadOk { messages })
                    .await
            }
            BroadcastPayload::Topology { topology } => {
                let id = node.id()?;
                let neighbors = neighbors_for(&topology, id).ok_or_else(|| {
                    RpcError::malformed_request(format!("topology has no entry for {}", id))
                })?;
                self.gossip.set_neighbors(neighbors);
                node.reply(&msg, &BroadcastPayload::TopologyOk).await
            }
            BroadcastPayload::BroadcastOk
            | BroadcastPayload::ReadOk { .. }
            | BroadcastPayload::TopologyOk => Err(RpcError::not_supported(format!(
                "{} is not a request",
                msg.kind()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn test_duplicate_broadcast_is_acknowledged_but_not_forwarded() {
        let (writer, reader) = tokio::io::duplex(4096);
        let node = Node::builder().build(writer);
        node.init("n1", vec!["n1".to_string(), "n2".to_string()])
            .unwrap();

        let handler = BroadcastHandler::new();
        handler.gossip().set_neighbors(vec!["n2".to_string()]);

        let request = |msg_id: u64| {
            Message::new(
                "c1",
                "n1",
                json!({"type": "broadcast", "message": 9, "msg_id": msg_id}),
            )
        };
        handler.handle(node.clone(), request(1)).await.unwrap();
        handler.handle(node.clone(), request(2)).await.unwrap();
        drop(node);

        let mut lines = BufReader::new(reader).lines();
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            out.push(Message::decode(&line).unwrap());
        }

        let forwards: Vec<_> = out.iter().filter(|m| m.dest == "n2").collect();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].body, json!({"type": "broadcast", "message": 9}));

        let acks: Vec<_> = out.iter().filter(|m| m.kind() == "broadcast_ok").collect();
        assert_eq!(acks.len(), 2);
        assert_eq!(handler.gossip().snapshot(), vec![BroadcastValue::from(9)]);
    }

    #[tokio::test]
    async fn test_topology_without_own_entry_is_rejected() {
        let (writer, _reader) = tokio::io::duplex(4096);
        let node = Node::builder().build(writer);
        node.init("n1", vec!["n1".to_string()]).unwrap();

        let handler = BroadcastHandler::new();
        handler.gossip().set_neighbors(vec!["n3".to_string()]);
        let msg = Message::new(
            "c1",
            "n1",
            json!({"type": "topology", "topology": {"n2": ["n1"]}, "msg_id": 1}),
        );

        let err = handler.handle(node, msg).await.unwrap_err();
        assert_eq!(
            err.rpc_error().map(|e| e.code),
            Some(maelstrom_protocol::ErrorCode::MalformedRequest)
        );
        assert_eq!(handler.gossip().neighbors(), vec!["n3".to_string()]);
    }
}
