//! Member subcommands: call the membership API of a single node, e.g. to
//! catch up a peer a broadcast did not reach.

use clap::{Args, Subcommand};

use shardherd_proto::request::{MemberRequest, NodeRequest, ResponseResult};

use crate::common::{print_success, request, unexpected};

#[derive(Args)]
pub struct MemberArgs {
    #[command(subcommand)]
    pub command: MemberCommands,
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Reload the node's shared system state
    Reload,
    /// Tell the node the cluster's replica-set name changed
    ConnUpdate { rs_name: String },
}

/// Execute a member subcommand.
pub async fn run(addr: &str, port: u16, args: MemberArgs) {
    let req = match args.command {
        MemberCommands::Reload => MemberRequest::LoadSystemStore,
        MemberCommands::ConnUpdate { rs_name } => {
            MemberRequest::UpdateMongoConnectionString { rs_name }
        }
    };
    let method = format!("{}.{}", req.api(), req.method());

    match request(addr, port, NodeRequest::Member(req)).await {
        ResponseResult::Success => print_success(&format!("{}: ok", method)),
        ResponseResult::ConnectionString(conn) => print_success(&format!("{}: {}", method, conn)),
        other => unexpected(other),
    }
}
