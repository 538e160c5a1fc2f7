//! Role subcommands: promote the node's database process.

use clap::{Args, Subcommand};

use shardherd_proto::request::{NodeRequest, ResponseResult};

use crate::common::{describe_propagation, exit_error, print_success, request, split_list, unexpected};

#[derive(Args)]
pub struct RoleArgs {
    #[command(subcommand)]
    pub command: RoleCommands,
}

#[derive(Subcommand)]
pub enum RoleCommands {
    /// Join replica set NAME and announce it to the cluster
    Replica {
        name: String,
        /// Reuse the existing data directory (first server of the cluster)
        #[arg(long)]
        first_shard: bool,
    },
    /// Become a server of shard NAME
    Shard {
        name: String,
        /// Reuse the existing data directory (first shard of the cluster)
        #[arg(long)]
        first_shard: bool,
    },
    /// (Re)start the router against a comma separated config-server list
    Router {
        #[arg(value_name = "ADDR[,ADDR...]")]
        config_servers: String,
    },
    /// Become a config server
    Config,
}

/// Execute a role subcommand.
pub async fn run(addr: &str, port: u16, args: RoleArgs) {
    let req = match args.command {
        RoleCommands::Replica { name, first_shard } => {
            NodeRequest::PromoteReplicaMember { name, first_shard }
        }
        RoleCommands::Shard { name, first_shard } => {
            NodeRequest::PromoteShardServer { name, first_shard }
        }
        RoleCommands::Router { config_servers } => NodeRequest::ConfigureRouter {
            config_servers: split_list(&config_servers),
        },
        RoleCommands::Config => NodeRequest::PromoteConfigServer,
    };

    match request(addr, port, req).await {
        ResponseResult::Promotion(outcome) => {
            print_success(&format!("{} registered as {}", outcome.program.name, outcome.role));
            println!("  command:     {}", outcome.program.command_line());
            if !outcome.removed.is_empty() {
                println!("  removed:     {}", outcome.removed.join(", "));
            }
            println!("  propagation: {}", describe_propagation(&outcome.propagation));
            if !outcome.propagation.is_complete() {
                eprintln!("Warning: not every peer was notified; retry with 'herd member conn-update'");
            }
        }
        ResponseResult::TransitionFailed(e) => exit_error(&e.to_string()),
        other => unexpected(other),
    }
}
