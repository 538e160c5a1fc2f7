//! Node subcommands: what the node is running.

use clap::{Args, Subcommand};
use tabled::{Table, Tabled};

use shardherd_proto::request::{NodeRequest, ResponseResult};
use shardherd_proto::ProgramDef;

use crate::common::{request, unexpected};

#[derive(Args)]
pub struct NodeArgs {
    #[command(subcommand)]
    pub command: NodeCommands,
}

#[derive(Subcommand)]
pub enum NodeCommands {
    /// Show roles, replica set and connection string
    Status,
    /// List the supervised database programs
    Programs,
}

#[derive(Tabled)]
struct ProgramRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Autostart")]
    autostart: bool,
    #[tabled(rename = "Priority")]
    priority: u32,
}

impl From<&ProgramDef> for ProgramRow {
    fn from(p: &ProgramDef) -> Self {
        Self {
            name: p.name.clone(),
            role: p.role().map_or_else(|| "-".to_string(), |r| r.to_string()),
            command: p.command_line(),
            user: p.user.clone(),
            autostart: p.autostart,
            priority: p.priority,
        }
    }
}

fn print_programs(programs: &[ProgramDef]) {
    if programs.is_empty() {
        println!("No database programs registered.");
        return;
    }
    let rows: Vec<ProgramRow> = programs.iter().map(ProgramRow::from).collect();
    println!("{}", Table::new(&rows));
}

/// Execute a node subcommand.
pub async fn run(addr: &str, port: u16, args: NodeArgs) {
    match args.command {
        NodeCommands::Status => match request(addr, port, NodeRequest::NodeStatus).await {
            ResponseResult::Status(status) => {
                let roles: Vec<String> = status.roles.iter().map(|r| r.to_string()).collect();
                println!(
                    "Roles:             {}",
                    if roles.is_empty() {
                        "-".to_string()
                    } else {
                        roles.join(", ")
                    }
                );
                println!(
                    "Replica set:       {}",
                    status.replica_set_name.as_deref().unwrap_or("-")
                );
                println!(
                    "Connection string: {}",
                    status.connection_string.as_deref().unwrap_or("-")
                );
                println!();
                print_programs(&status.programs);
            }
            other => unexpected(other),
        },
        NodeCommands::Programs => match request(addr, port, NodeRequest::ListPrograms).await {
            ResponseResult::Programs(programs) => print_programs(&programs),
            other => unexpected(other),
        },
    }
}
