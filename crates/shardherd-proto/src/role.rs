/// Node roles and their mapping to supervisor program names.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::*;

/// The role a database process plays in the cluster.
///
/// A node runs at most one data-bearing role (standalone, replica member or
/// shard server). Config-server and router processes are companions that
/// may run next to it, each at most once per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterNodeRole {
    Standalone,
    ReplicaMember,
    ShardServer,
    ConfigServer,
    Router,
}

impl ClusterNodeRole {
    /// Whether processes of this role own a data directory of user data.
    pub fn is_data_role(self) -> bool {
        matches!(
            self,
            Self::Standalone | Self::ReplicaMember | Self::ShardServer
        )
    }

    /// Classify a supervisor program by its name.
    ///
    /// Returns `None` for programs that are not database processes.
    pub fn from_program_name(name: &str) -> Option<Self> {
        match name {
            STANDALONE_PROGRAM => Some(Self::Standalone),
            ROUTER_PROGRAM => Some(Self::Router),
            CONFIG_PROGRAM => Some(Self::ConfigServer),
            n if n.len() > REPLICA_PROGRAM_PREFIX.len()
                && n.starts_with(REPLICA_PROGRAM_PREFIX) =>
            {
                Some(Self::ReplicaMember)
            }
            n if n.len() > SHARD_PROGRAM_PREFIX.len() && n.starts_with(SHARD_PROGRAM_PREFIX) => {
                Some(Self::ShardServer)
            }
            _ => None,
        }
    }

    /// Supervisor program name of this role for the given set/shard name.
    pub fn program_name(self, set_name: &str) -> String {
        match self {
            Self::Standalone => STANDALONE_PROGRAM.to_string(),
            Self::ReplicaMember => format!("{}{}", REPLICA_PROGRAM_PREFIX, set_name),
            Self::ShardServer => format!("{}{}", SHARD_PROGRAM_PREFIX, set_name),
            Self::ConfigServer => CONFIG_PROGRAM.to_string(),
            Self::Router => ROUTER_PROGRAM.to_string(),
        }
    }
}

impl fmt::Display for ClusterNodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standalone => "standalone",
            Self::ReplicaMember => "replica-member",
            Self::ShardServer => "shard-server",
            Self::ConfigServer => "config-server",
            Self::Router => "router",
        };
        f.write_str(s)
    }
}
