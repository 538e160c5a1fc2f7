//! Database pass-through subcommands: replica sets, shards and the
//! connection string.

use clap::{Args, Subcommand};

use shardherd_proto::request::{NodeRequest, ResponseResult};

use crate::common::{print_success, request, split_list, unexpected};

#[derive(Args)]
pub struct ReplsetArgs {
    #[command(subcommand)]
    pub command: ReplsetCommands,
}

#[derive(Subcommand)]
pub enum ReplsetCommands {
    /// Initiate replica set SET with the given members
    Initiate {
        set: String,
        #[arg(value_name = "ADDR[,ADDR...]")]
        members: String,
        /// The set is the config servers' replica set
        #[arg(long)]
        config: bool,
    },
    /// Replace the member list of replica set SET
    AddMembers {
        set: String,
        #[arg(value_name = "ADDR[,ADDR...]")]
        members: String,
        #[arg(long)]
        config: bool,
    },
    /// Ask whether the node is primary of SET
    IsMaster {
        set: String,
        #[arg(long)]
        config: bool,
    },
}

#[derive(Args)]
pub struct ShardArgs {
    #[command(subcommand)]
    pub command: ShardCommands,
}

#[derive(Subcommand)]
pub enum ShardCommands {
    /// Register shard NAME, seeded by the member at ADDRESS
    Add { name: String, address: String },
}

#[derive(Args)]
pub struct ConnArgs {
    #[command(subcommand)]
    pub command: ConnCommands,
}

#[derive(Subcommand)]
pub enum ConnCommands {
    /// Rebuild the node's connection string and adopt it
    Rebuild,
}

/// Execute a replset subcommand.
pub async fn run_replset(addr: &str, port: u16, args: ReplsetArgs) {
    match args.command {
        ReplsetCommands::Initiate {
            set,
            members,
            config,
        } => {
            let req = NodeRequest::InitiateReplicaSet {
                set: set.clone(),
                members: split_list(&members),
                is_config_set: config,
            };
            expect_success(request(addr, port, req).await);
            print_success(&format!("replica set {} initiated", set));
        }
        ReplsetCommands::AddMembers {
            set,
            members,
            config,
        } => {
            let req = NodeRequest::AddReplicaSetMembers {
                set: set.clone(),
                members: split_list(&members),
                is_config_set: config,
            };
            expect_success(request(addr, port, req).await);
            print_success(&format!("replica set {} members updated", set));
        }
        ReplsetCommands::IsMaster { set, config } => {
            let req = NodeRequest::IsMaster {
                is_config_set: config,
                set_name: set,
            };
            match request(addr, port, req).await {
                ResponseResult::Master(status) => {
                    println!("ismaster: {}", status.is_master);
                    println!("set:      {}", status.set_name.as_deref().unwrap_or("-"));
                    println!("primary:  {}", status.primary.as_deref().unwrap_or("-"));
                    println!("hosts:    {}", status.hosts.join(", "));
                }
                other => unexpected(other),
            }
        }
    }
}

/// Execute a shard subcommand.
pub async fn run_shard(addr: &str, port: u16, args: ShardArgs) {
    match args.command {
        ShardCommands::Add { name, address } => {
            let req = NodeRequest::AddShardMember {
                name: name.clone(),
                address,
            };
            expect_success(request(addr, port, req).await);
            print_success(&format!("shard {} added", name));
        }
    }
}

/// Execute a conn subcommand.
pub async fn run_conn(addr: &str, port: u16, args: ConnArgs) {
    match args.command {
        ConnCommands::Rebuild => {
            match request(addr, port, NodeRequest::RebuildConnectionString).await {
                ResponseResult::ConnectionString(conn) => print_success(&conn),
                other => unexpected(other),
            }
        }
    }
}

fn expect_success(result: ResponseResult) {
    if result != ResponseResult::Success {
        unexpected(result);
    }
}
