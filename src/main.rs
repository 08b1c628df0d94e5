use clap::Parser;
use maelstrom_node::{config::NodeConfig, logging::init_logging, workloads};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::parse();
    config.validate()?;
    init_logging(&config.logging())?;

    let program = std::env::args().next();
    let workload = config.resolve_workload(program.as_deref())?;
    info!(
        ?workload,
        kv_service = %config.kv_service,
        rpc_timeout_ms = config.rpc_timeout_ms,
        "Starting node"
    );

    let node = workloads::build_node(workload, &config, tokio::io::stdout())?;
    if let Err(e) = node.run(tokio::io::stdin()).await {
        error!(error = %e, "Node terminated");
        return Err(e.into());
    }
    Ok(())
}
