use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use nanokv::{
    cli::{Cli, Command, NodeArgs, ProxyArgs},
    node::{self, NodeConfig, NodeState},
    proxy::{self, ProxyState},
    wal::{Durability, Recovery},
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Node(args) => run_node(args).await,
        Command::Proxy(args) => run_proxy(args).await,
    }
}

async fn run_node(args: NodeArgs) -> Result<()> {
    let durability = if args.fsync {
        Durability::Always
    } else {
        Durability::Buffered
    };
    let recovery = if args.strict_replay {
        Recovery::Strict
    } else {
        Recovery::Lenient
    };

    let state = NodeState::open(NodeConfig {
        node_id: format!("NODE-{}", args.listen.port()),
        wal_path: args.db,
        durability,
        recovery,
    })
    .await?;

    let listener = TcpListener::bind(args.listen).await?;
    info!("node listening on {}", listener.local_addr()?);
    axum::serve(listener, node::router(Arc::new(state))).await?;
    Ok(())
}

async fn run_proxy(args: ProxyArgs) -> Result<()> {
    let state = ProxyState::new(args.nodes, Duration::from_secs(args.timeout_secs))?;
    for (index, node) in state.router().nodes().iter().enumerate() {
        info!("shard {index} -> {node}");
    }

    let listener = TcpListener::bind(args.listen).await?;
    info!("proxy listening on {}", listener.local_addr()?);
    axum::serve(listener, proxy::router(Arc::new(state))).await?;
    Ok(())
}
