//! In-memory database client.
//!
//! Keeps replica sets and shards in maps and answers is-master queries from
//! them: the first member of a set is its primary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use shardherd_proto::{HerdError, HerdResult, MasterStatus, ReplicaSetIdentity, ShardTopology};

use super::{build_connection_string, DatabaseClient};

#[derive(Default)]
struct LocalDb {
    sets: BTreeMap<String, ReplicaSetIdentity>,
    shards: BTreeMap<String, ShardTopology>,
}

/// Database client that models the deployment in memory.
pub struct LocalDatabase {
    /// Address of this node, as it appears in member lists.
    self_addr: String,
    db: RwLock<LocalDb>,
}

impl LocalDatabase {
    pub fn new(self_addr: impl Into<String>) -> Self {
        Self {
            self_addr: self_addr.into(),
            db: RwLock::new(LocalDb::default()),
        }
    }

    #[cfg(test)]
    pub async fn replica_set(&self, name: &str) -> Option<ReplicaSetIdentity> {
        self.db.read().await.sets.get(name).cloned()
    }

    #[cfg(test)]
    pub async fn shards(&self) -> Vec<ShardTopology> {
        self.db.read().await.shards.values().cloned().collect()
    }
}

#[async_trait]
impl DatabaseClient for LocalDatabase {
    fn name(&self) -> &str {
        "local"
    }

    async fn initiate_replica_set(&self, set: &ReplicaSetIdentity) -> HerdResult<()> {
        let mut db = self.db.write().await;
        if db.sets.contains_key(&set.name) {
            return Err(HerdError::Database(format!(
                "replica set {} already initialized",
                set.name
            )));
        }
        info!("local db: initiated replica set {} {:?}", set.name, set.members);
        db.sets.insert(set.name.clone(), set.clone());
        Ok(())
    }

    async fn replica_update_members(&self, set: &ReplicaSetIdentity) -> HerdResult<()> {
        let mut db = self.db.write().await;
        let existing = db.sets.get_mut(&set.name).ok_or_else(|| {
            HerdError::Database(format!("no replica set config for {}", set.name))
        })?;
        if existing.is_config_set != set.is_config_set {
            return Err(HerdError::Database(format!(
                "replica set {} config-server flag mismatch",
                set.name
            )));
        }
        existing.members = set.members.clone();
        info!("local db: replica set {} members {:?}", set.name, set.members);
        Ok(())
    }

    async fn add_shard(&self, shard: &ShardTopology) -> HerdResult<()> {
        let mut db = self.db.write().await;
        if db.shards.contains_key(&shard.name) {
            return Err(HerdError::Database(format!(
                "shard {} already exists",
                shard.name
            )));
        }
        info!("local db: added shard {}", shard.shard_host());
        db.shards.insert(shard.name.clone(), shard.clone());
        Ok(())
    }

    async fn is_master(&self, is_config_set: bool, set_name: &str) -> HerdResult<MasterStatus> {
        let db = self.db.read().await;
        let set = db
            .sets
            .get(set_name)
            .filter(|s| s.is_config_set == is_config_set)
            .ok_or_else(|| HerdError::Database(format!("no replica set config for {}", set_name)))?;
        let hosts = set.member_hosts();
        Ok(MasterStatus {
            is_master: set.members.first() == Some(&self.self_addr),
            set_name: Some(set.name.clone()),
            primary: hosts.first().cloned(),
            hosts,
        })
    }

    async fn update_connection_string(&self, rs_name: Option<&str>) -> HerdResult<String> {
        Ok(build_connection_string(rs_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_initiate_and_query_master() {
        let db = LocalDatabase::new("10.0.0.1");
        let set = ReplicaSetIdentity::new("rs1", members(&["10.0.0.1", "10.0.0.2"]), false).unwrap();
        db.initiate_replica_set(&set).await.unwrap();
        assert!(db.initiate_replica_set(&set).await.is_err());

        let status = db.is_master(false, "rs1").await.unwrap();
        assert!(status.is_master);
        assert_eq!(status.primary.as_deref(), Some("10.0.0.1:27000"));
        assert_eq!(status.hosts.len(), 2);

        // Asking for the config set of the same name finds nothing.
        assert!(db.is_master(true, "rs1").await.is_err());
    }

    #[tokio::test]
    async fn test_update_members_requires_existing_set() {
        let db = LocalDatabase::new("10.0.0.2");
        let set = ReplicaSetIdentity::config_set(members(&["10.0.0.1"])).unwrap();
        assert!(db.replica_update_members(&set).await.is_err());

        db.initiate_replica_set(&set).await.unwrap();
        let grown =
            ReplicaSetIdentity::config_set(members(&["10.0.0.1", "10.0.0.2", "10.0.0.3"])).unwrap();
        db.replica_update_members(&grown).await.unwrap();
        assert_eq!(db.replica_set("config0").await.unwrap().members.len(), 3);
        assert!(!db.is_master(true, "config0").await.unwrap().is_master);
    }

    #[tokio::test]
    async fn test_add_shard_once() {
        let db = LocalDatabase::new("10.0.0.1");
        let shard = ShardTopology {
            name: "shard1".to_string(),
            seed: "10.0.0.1".to_string(),
            first_shard: true,
        };
        db.add_shard(&shard).await.unwrap();
        assert!(db.add_shard(&shard).await.is_err());
        assert_eq!(db.shards().await.len(), 1);
    }
}
