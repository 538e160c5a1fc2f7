//! Shardherd operator CLI (herd).
//!
//! Sends role-transition, database and membership requests to a shardherd
//! daemon over the node RPC protocol.
//!
//! # Usage
//!
//! ```text
//! herd [OPTIONS] <COMMAND>
//!
//! Commands:
//!   role     Move the node's database process to another role
//!   replset  Replica-set administration
//!   shard    Shard administration
//!   conn     Connection string management
//!   node     Node status
//!   member   Invoke the cluster membership API on one node
//!
//! Options:
//!   -a, --address <ADDRESS>  Daemon address [default: 127.0.0.1]
//!   -p, --port <PORT>        Daemon port [default: 7400]
//! ```

mod common;
mod db;
mod member;
mod node;
mod role;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shardherd_proto::defaults::DEFAULT_RPC_PORT;

/// Shardherd cluster topology tool.
#[derive(Parser)]
#[command(name = "herd", version, about = "Shardherd cluster topology tool")]
struct Cli {
    /// Daemon address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    address: String,

    /// Daemon port
    #[arg(short = 'p', long, default_value_t = DEFAULT_RPC_PORT)]
    port: u16,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the node's database process to another role
    Role(role::RoleArgs),
    /// Replica-set administration
    Replset(db::ReplsetArgs),
    /// Shard administration
    Shard(db::ShardArgs),
    /// Connection string management
    Conn(db::ConnArgs),
    /// Node status
    Node(node::NodeArgs),
    /// Invoke the cluster membership API on one node
    Member(member::MemberArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let addr = &cli.address;
    let port = cli.port;

    match cli.command {
        Commands::Role(args) => role::run(addr, port, args).await,
        Commands::Replset(args) => db::run_replset(addr, port, args).await,
        Commands::Shard(args) => db::run_shard(addr, port, args).await,
        Commands::Conn(args) => db::run_conn(addr, port, args).await,
        Commands::Node(args) => node::run(addr, port, args).await,
        Commands::Member(args) => member::run(addr, port, args).await,
    }
}
