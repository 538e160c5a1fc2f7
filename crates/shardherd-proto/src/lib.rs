//! # shardherd-proto
//!
//! Types shared by every shardherd component: the error enum, cluster
//! constants and defaults, node roles, supervised program definitions,
//! replica-set / shard / router topology, and the node RPC protocol.

pub mod constants;
pub mod defaults;
pub mod error;
pub mod program;
pub mod request;
pub mod role;
pub mod topology;

// Re-export commonly used types at the crate root
pub use error::{HerdError, HerdResult, StepError, TransitionStep};
pub use program::ProgramDef;
pub use request::{MemberRequest, NodeRequest, NodeResponse, PromotionOutcome, Propagation};
pub use role::ClusterNodeRole;
pub use topology::{MasterStatus, ReplicaSetIdentity, RouterConfig, ShardTopology};
