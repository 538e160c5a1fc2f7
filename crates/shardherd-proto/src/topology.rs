/// Replica-set, shard and router topology types.

use serde::{Deserialize, Serialize};

use crate::constants::{CFG_PORT, CFG_RSET_NAME, ROUTER_QUORUM, SHARD_SRV_PORT};
use crate::error::{HerdError, HerdResult};

/// Which replica set (data or config) a node belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetIdentity {
    pub name: String,
    /// Member addresses, without ports.
    pub members: Vec<String>,
    pub is_config_set: bool,
}

impl ReplicaSetIdentity {
    pub fn new(name: impl Into<String>, members: Vec<String>, is_config_set: bool) -> HerdResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(HerdError::InvalidArgument(
                "replica set name must be supplied".to_string(),
            ));
        }
        if members.is_empty() {
            return Err(HerdError::InvalidArgument(format!(
                "replica set {} needs at least one member",
                name
            )));
        }
        Ok(Self {
            name,
            members,
            is_config_set,
        })
    }

    /// The config servers' replica set.
    pub fn config_set(members: Vec<String>) -> HerdResult<Self> {
        Self::new(CFG_RSET_NAME, members, true)
    }

    /// Port members of this set listen on.
    pub fn port(&self) -> u16 {
        if self.is_config_set {
            CFG_PORT
        } else {
            SHARD_SRV_PORT
        }
    }

    /// Member addresses annotated with the set's port.
    pub fn member_hosts(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| format!("{}:{}", m, self.port()))
            .collect()
    }
}

/// Parameters of a shard-server promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTopology {
    pub name: String,
    /// Address of the shard's seed member.
    pub seed: String,
    /// The cluster's very first shard reuses the standalone data directory.
    pub first_shard: bool,
}

impl ShardTopology {
    /// `name/seed:port`, the form a router expects when adding a shard.
    pub fn shard_host(&self) -> String {
        format!("{}/{}:{}", self.name, self.seed, SHARD_SRV_PORT)
    }
}

/// Config-server addresses a router is started with.
///
/// Rebuilt from the full config-server list every time the router topology
/// changes; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub config_servers: Vec<String>,
}

impl RouterConfig {
    /// Apply the quorum rule: a router is given either a single config
    /// server or a set of at least [`ROUTER_QUORUM`] servers, never a set of
    /// two. With fewer than the quorum only the first address is used.
    pub fn from_config_servers(addresses: &[String]) -> HerdResult<Self> {
        let first = addresses.first().ok_or_else(|| {
            HerdError::InvalidArgument("router needs at least one config server".to_string())
        })?;
        if let Some(bad) = addresses.iter().find(|a| a.trim().is_empty()) {
            return Err(HerdError::InvalidArgument(format!(
                "invalid config server address '{}'",
                bad
            )));
        }
        let config_servers = if addresses.len() < ROUTER_QUORUM {
            vec![first.clone()]
        } else {
            addresses.to_vec()
        };
        Ok(Self { config_servers })
    }

    /// The `--configdb` argument: every address suffixed with the config
    /// port, comma separated.
    pub fn configdb(&self) -> String {
        self.config_servers
            .iter()
            .map(|s| format!("{}:{}", s, CFG_PORT))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Result of an is-master query against a replica set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterStatus {
    pub is_master: bool,
    pub set_name: Option<String>,
    pub primary: Option<String>,
    pub hosts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("10.0.0.{}", i)).collect()
    }

    #[test]
    fn test_router_quorum_rule() {
        assert_eq!(
            RouterConfig::from_config_servers(&addrs(1)).unwrap().configdb(),
            "10.0.0.1:26050"
        );
        assert_eq!(
            RouterConfig::from_config_servers(&addrs(2)).unwrap().configdb(),
            "10.0.0.1:26050"
        );
        assert_eq!(
            RouterConfig::from_config_servers(&addrs(3)).unwrap().configdb(),
            "10.0.0.1:26050,10.0.0.2:26050,10.0.0.3:26050"
        );
        let four = RouterConfig::from_config_servers(&addrs(4)).unwrap();
        assert_eq!(four.config_servers.len(), 4);
        assert!(four.configdb().ends_with("10.0.0.4:26050"));
    }

    #[test]
    fn test_router_rejects_empty() {
        assert!(RouterConfig::from_config_servers(&[]).is_err());
        assert!(RouterConfig::from_config_servers(&["".to_string()]).is_err());
    }

    #[test]
    fn test_member_hosts_use_set_port() {
        let data = ReplicaSetIdentity::new("rs1", addrs(2), false).unwrap();
        assert_eq!(data.member_hosts(), vec!["10.0.0.1:27000", "10.0.0.2:27000"]);

        let cfg = ReplicaSetIdentity::config_set(addrs(1)).unwrap();
        assert_eq!(cfg.name, "config0");
        assert_eq!(cfg.member_hosts(), vec!["10.0.0.1:26050"]);
    }

    #[test]
    fn test_replica_set_validation() {
        assert!(ReplicaSetIdentity::new("", addrs(1), false).is_err());
        assert!(ReplicaSetIdentity::new("rs1", Vec::new(), false).is_err());
    }

    #[test]
    fn test_shard_host() {
        let shard = ShardTopology {
            name: "shard2".to_string(),
            seed: "10.0.0.9".to_string(),
            first_shard: false,
        };
        assert_eq!(shard.shard_host(), "shard2/10.0.0.9:27000");
    }
}
