/// Fixed cluster constants shared by every node.
///
/// These are part of the cluster contract: all nodes must agree on them,
/// so they are not configurable.

/// Internal RPC protocol version
pub const HERD_PROTO_VER: u8 = 0x01;

/// Port of replica-member and shard-server processes
pub const SHARD_SRV_PORT: u16 = 27000;
/// Port of config-server processes
pub const CFG_PORT: u16 = 26050;
/// Port of the pre-cluster standalone process
pub const STANDALONE_PORT: u16 = 27017;
/// Port of the router process
pub const ROUTER_PORT: u16 = 27020;

/// Replica-set name used by the config servers
pub const CFG_RSET_NAME: &str = "config0";

/// Database name used in connection strings
pub const DB_NAME: &str = "nbcore";

/// Supervisor key of the standalone database process
pub const STANDALONE_PROGRAM: &str = "mongodb";
/// Supervisor key of the router process
pub const ROUTER_PROGRAM: &str = "mongos";
/// Supervisor key of the config-server process
pub const CONFIG_PROGRAM: &str = "mongocfg";
/// Supervisor key prefix of replica-member processes
pub const REPLICA_PROGRAM_PREFIX: &str = "mongors-";
/// Supervisor key prefix of shard-server processes
pub const SHARD_PROGRAM_PREFIX: &str = "mongoshard-";
/// Substring identifying database-related supervisor programs
pub const MONGO_PROGRAM_MARKER: &str = "mongo";

/// Data directory suffix of replica-member processes
pub const REPLICA_DIR_SUFFIX: &str = "rs";
/// Config-server data directory name, under the database base path
pub const CFG_DIR_NAME: &str = "cfg0";

/// Persisted local key holding this node's replica-set name
pub const REPLICA_SET_KEY: &str = "MONGO_REPLICA_SET";

/// Database server binary
pub const MONGOD_BIN: &str = "mongod";
/// Router binary
pub const MONGOS_BIN: &str = "mongos";

/// Working directory of supervised database processes
pub const PROGRAM_DIRECTORY: &str = "/usr/bin";
/// Run-as identity of supervised database processes
pub const PROGRAM_USER: &str = "root";
/// Supervisor priority of database processes
pub const PROGRAM_PRIORITY: u32 = 1;

/// Minimum number of config servers a router accepts as a set
pub const ROUTER_QUORUM: usize = 3;

/// Stable RPC namespace of the membership handler
pub const MEMBER_API: &str = "cluster_member_api";
