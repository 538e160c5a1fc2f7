//! Database client backends.
//!
//! Operations against the live database deployment. The controller only
//! passes these through; replication and sharding themselves are the
//! database's business.
//!
//! - `local`: in-memory model of replica sets and shards, for tests and
//!   single-node development.
//! - `shell`: drives the `mongo` shell with `--eval`.

use async_trait::async_trait;
use shardherd_proto::constants::{DB_NAME, SHARD_SRV_PORT, STANDALONE_PORT};
use shardherd_proto::{HerdResult, MasterStatus, ReplicaSetIdentity, ShardTopology};

/// Trait that all database client backends must implement.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Human-readable name of this backend.
    fn name(&self) -> &str;

    /// Initiate a new replica set with the given members.
    async fn initiate_replica_set(&self, set: &ReplicaSetIdentity) -> HerdResult<()>;

    /// Replace the member list of an existing replica set.
    async fn replica_update_members(&self, set: &ReplicaSetIdentity) -> HerdResult<()>;

    /// Register a shard with the cluster's routers.
    async fn add_shard(&self, shard: &ShardTopology) -> HerdResult<()>;

    /// Ask the local member of `set_name` whether it is the primary.
    async fn is_master(&self, is_config_set: bool, set_name: &str) -> HerdResult<MasterStatus>;

    /// Rebuild the connection string for the given replica-set name, or
    /// for the standalone deployment when there is none.
    async fn update_connection_string(&self, rs_name: Option<&str>) -> HerdResult<String>;
}

/// Connection string of the local deployment.
pub fn build_connection_string(rs_name: Option<&str>) -> String {
    match rs_name.filter(|n| !n.is_empty()) {
        Some(rs) => format!(
            "mongodb://127.0.0.1:{}/{}?replicaSet={}",
            SHARD_SRV_PORT, DB_NAME, rs
        ),
        None => format!("mongodb://127.0.0.1:{}/{}", STANDALONE_PORT, DB_NAME),
    }
}

pub mod local;
pub mod shell;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_connection_string() {
        assert_eq!(
            build_connection_string(Some("rs1")),
            "mongodb://127.0.0.1:27000/nbcore?replicaSet=rs1"
        );
        assert_eq!(
            build_connection_string(None),
            "mongodb://127.0.0.1:27017/nbcore"
        );
        assert_eq!(
            build_connection_string(Some("")),
            "mongodb://127.0.0.1:27017/nbcore"
        );
    }
}
