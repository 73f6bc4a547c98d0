use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a storage node: in-memory map durable via an append-only log.
    Node(NodeArgs),
    /// Run the routing proxy in front of a fixed list of nodes.
    Proxy(ProxyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Socket address the node should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Path of the write-ahead log file.
    #[arg(long, default_value = "data.log")]
    pub db: PathBuf,

    /// Sync the log to stable storage after every write. Slower, but closes
    /// the crash loss window.
    #[arg(long)]
    pub fsync: bool,

    /// Abort startup on the first malformed log record instead of skipping it.
    #[arg(long)]
    pub strict_replay: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// Socket address the proxy should bind to.
    #[arg(long, default_value = "127.0.0.1:9000")]
    pub listen: SocketAddr,

    /// Node base URL, repeated once per node, in shard order.
    #[arg(long = "node", required = true)]
    pub nodes: Vec<String>,

    /// Per-request timeout for forwarded calls, in seconds.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}
