/// Request and response types for the node RPC protocol.
///
/// Every frame is a bincode-encoded `(RequestHeader, NodeRequest)` on the
/// way in and a `NodeResponse` on the way out.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::constants::MEMBER_API;
use crate::error::{HerdError, StepError};
use crate::program::ProgramDef;
use crate::role::ClusterNodeRole;
use crate::topology::MasterStatus;

/// Common header for all requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Protocol version
    pub proto_ver: u8,
    /// Request ID (for matching responses)
    pub id: u32,
}

/// Requests a node answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRequest {
    // ---- Role transitions ----
    PromoteReplicaMember {
        name: String,
        first_shard: bool,
    },
    PromoteShardServer {
        name: String,
        first_shard: bool,
    },
    ConfigureRouter {
        config_servers: Vec<String>,
    },
    PromoteConfigServer,

    // ---- Database pass-through ----
    InitiateReplicaSet {
        set: String,
        members: Vec<String>,
        is_config_set: bool,
    },
    AddReplicaSetMembers {
        set: String,
        members: Vec<String>,
        is_config_set: bool,
    },
    AddShardMember {
        name: String,
        address: String,
    },
    IsMaster {
        is_config_set: bool,
        set_name: String,
    },
    RebuildConnectionString,

    // ---- Status ----
    NodeStatus,
    ListPrograms,

    // ---- Broadcast targets ----
    Member(MemberRequest),
}

/// Methods of the cluster membership API, invoked on every peer by a
/// cluster broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRequest {
    /// Reload the shared system state from the database.
    LoadSystemStore,
    /// The cluster's replica-set name changed; re-derive the connection
    /// string.
    UpdateMongoConnectionString { rs_name: String },
}

impl MemberRequest {
    /// RPC namespace the method lives in.
    pub fn api(&self) -> &'static str {
        MEMBER_API
    }

    /// Stable method name within [`MemberRequest::api`].
    pub fn method(&self) -> &'static str {
        match self {
            Self::LoadSystemStore => "load_system_store",
            Self::UpdateMongoConnectionString { .. } => "update_mongo_connection_string",
        }
    }
}

/// Outcome of delivering a broadcast to the rest of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Propagation {
    /// The transition does not change cluster-wide identity.
    NotRequired,
    /// Every known peer acknowledged.
    Complete { peers: Vec<SocketAddr> },
    /// Some peers acknowledged, others failed.
    Partial {
        delivered: Vec<SocketAddr>,
        failed: Vec<PeerFailure>,
    },
    /// The broadcast could not be delivered to any peer.
    Failed { failed: Vec<PeerFailure>, reason: Option<HerdError> },
}

impl Propagation {
    /// Whether every peer that needed the update received it.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::NotRequired | Self::Complete { .. })
    }
}

/// A peer that did not acknowledge a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFailure {
    pub peer: SocketAddr,
    pub error: HerdError,
}

/// Result of a successful role transition.
///
/// The transition is committed locally; `propagation` reports separately
/// whether the rest of the cluster heard about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionOutcome {
    pub role: ClusterNodeRole,
    pub program: ProgramDef,
    /// Programs removed from supervision on the way in.
    pub removed: Vec<String>,
    pub propagation: Propagation,
}

/// Snapshot of a node's database topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub roles: Vec<ClusterNodeRole>,
    pub replica_set_name: Option<String>,
    pub connection_string: Option<String>,
    pub programs: Vec<ProgramDef>,
}

/// Response from a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResponse {
    /// Protocol version
    pub proto_ver: u8,
    /// Request ID this responds to
    pub id: u32,
    /// Response result
    pub result: ResponseResult,
}

/// Response payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseResult {
    /// Success with no additional data
    Success,
    /// Error
    Error(HerdError),
    /// A role transition failed at a specific step
    TransitionFailed(StepError),
    /// A role transition committed locally
    Promotion(PromotionOutcome),
    Master(MasterStatus),
    ConnectionString(String),
    Status(NodeStatus),
    Programs(Vec<ProgramDef>),
}

impl NodeResponse {
    /// Create a response carrying `result`.
    pub fn new(proto_ver: u8, id: u32, result: ResponseResult) -> Self {
        Self {
            proto_ver,
            id,
            result,
        }
    }

    /// Create an error response.
    pub fn error(proto_ver: u8, id: u32, err: HerdError) -> Self {
        Self::new(proto_ver, id, ResponseResult::Error(err))
    }

    /// Check if this response indicates success.
    pub fn is_success(&self) -> bool {
        !matches!(
            self.result,
            ResponseResult::Error(_) | ResponseResult::TransitionFailed(_)
        )
    }
}
