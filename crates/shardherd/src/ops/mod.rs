//! Operation dispatch.
//!
//! Each request is classified and handed to the handler for its class.
//! Role transitions answer `Promotion` or `TransitionFailed`; every other
//! failure is returned as an `Err` and becomes an `Error` response.

pub mod member;
pub mod topology;

use shardherd_proto::request::{NodeRequest, ResponseResult};
use shardherd_proto::HerdResult;
use tracing::debug;

use crate::daemon::SharedNode;
use crate::request::Request;

/// Operation classification, determines routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Changes which database process this node runs.
    Transition,
    /// Delegated to the database client.
    Database,
    /// Read-only queries about this node.
    Status,
    /// Membership API, invoked by a peer's broadcast.
    Member,
}

/// Classify a request into its operation type.
pub fn classify(req: &NodeRequest) -> OpType {
    match req {
        NodeRequest::PromoteReplicaMember { .. }
        | NodeRequest::PromoteShardServer { .. }
        | NodeRequest::ConfigureRouter { .. }
        | NodeRequest::PromoteConfigServer => OpType::Transition,

        NodeRequest::InitiateReplicaSet { .. }
        | NodeRequest::AddReplicaSetMembers { .. }
        | NodeRequest::AddShardMember { .. }
        | NodeRequest::IsMaster { .. }
        | NodeRequest::RebuildConnectionString => OpType::Database,

        NodeRequest::NodeStatus | NodeRequest::ListPrograms => OpType::Status,

        NodeRequest::Member(_) => OpType::Member,
    }
}

/// Process a request, routing to the appropriate handler.
pub async fn process(node: SharedNode, request: Request) -> HerdResult<ResponseResult> {
    let op_type = classify(&request.req);
    debug!("processing {:?} request id={}", op_type, request.header.id);

    match (op_type, request.req) {
        (OpType::Member, NodeRequest::Member(req)) => member::handle(&node.member, req).await,
        (_, req) => topology::handle(node, req).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardherd_proto::request::MemberRequest;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&NodeRequest::PromoteShardServer {
                name: "s1".to_string(),
                first_shard: true
            }),
            OpType::Transition
        );
        assert_eq!(classify(&NodeRequest::PromoteConfigServer), OpType::Transition);
        assert_eq!(
            classify(&NodeRequest::RebuildConnectionString),
            OpType::Database
        );
        assert_eq!(classify(&NodeRequest::ListPrograms), OpType::Status);
        assert_eq!(
            classify(&NodeRequest::Member(MemberRequest::LoadSystemStore)),
            OpType::Member
        );
    }
}
