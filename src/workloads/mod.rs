//! Workload handlers layered on the node runtime.

pub mod broadcast;
pub mod counter;
pub mod unique_ids;

pub use broadcast::BroadcastHandler;
pub use counter::CounterHandler;
pub use unique_ids::UniqueIdHandler;

use tokio::io::AsyncWrite;

use crate::{
    config::{NodeConfig, Workload},
    error::NodeResult,
    node::{Node, NodeBuilder},
};

/// Register the handlers serving `workload`.
pub fn register(
    builder: NodeBuilder,
    workload: Workload,
    config: &NodeConfig,
) -> NodeResult<NodeBuilder> {
    match workload {
        Workload::Broadcast => BroadcastHandler::new().register(builder),
        Workload::Counter => CounterHandler::new(config.kv_service.as_str())
            .with_retry_policy(config.cas_retry_policy())
            .register(builder),
        Workload::UniqueIds => UniqueIdHandler::new().register(builder),
    }
}

/// A node serving `workload`, writing protocol messages to `output`.
pub fn build_node<W>(workload: Workload, config: &NodeConfig, output: W) -> NodeResult<Node>
where
    W: AsyncWrite + Send + 'static,
{
    let builder = Node::builder().options(config.node_options());
    Ok(register(builder, workload, config)?.build(output))
}
