//! Message handlers and the registry that routes requests to them.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use maelstrom_protocol::Message;

use super::Node;
use crate::error::{NodeError, NodeResult};

/// Application logic for one or more request types.
///
/// Returning an [`maelstrom_protocol::RpcError`] sends that error back to the
/// requester; any other error is reported as `crash`.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, node: Node, msg: Message) -> NodeResult<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Node, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = NodeResult<()>> + Send + 'static,
{
    async fn handle(&self, node: Node, msg: Message) -> NodeResult<()> {
        (self)(node, msg).await
    }
}

/// Mapping from message type to handler, fixed before the node starts.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) -> NodeResult<()> {
        let kind = kind.into();
        if self.handlers.contains_key(&kind) {
            return Err(NodeError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered message types, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
