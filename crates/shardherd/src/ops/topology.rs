//! Controller operations: role transitions, database pass-through and
//! status queries.

use shardherd_proto::request::{NodeRequest, ResponseResult};
use shardherd_proto::{HerdError, HerdResult};
use tracing::warn;

use crate::controller::PromotionResult;
use crate::daemon::SharedNode;

/// Handle a controller operation.
pub async fn handle(node: SharedNode, req: NodeRequest) -> HerdResult<ResponseResult> {
    let ctl = &node.controller;
    match req {
        NodeRequest::PromoteReplicaMember { name, first_shard } => Ok(transition(
            ctl.promote_to_replica_member(&name, first_shard).await,
        )),
        NodeRequest::PromoteShardServer { name, first_shard } => Ok(transition(
            ctl.promote_to_shard_server(&name, first_shard).await,
        )),
        NodeRequest::ConfigureRouter { config_servers } => {
            Ok(transition(ctl.configure_router(&config_servers).await))
        }
        NodeRequest::PromoteConfigServer => Ok(transition(ctl.promote_to_config_server().await)),

        NodeRequest::InitiateReplicaSet {
            set,
            members,
            is_config_set,
        } => {
            ctl.initiate_replica_set(&set, members, is_config_set)
                .await?;
            Ok(ResponseResult::Success)
        }
        NodeRequest::AddReplicaSetMembers {
            set,
            members,
            is_config_set,
        } => {
            ctl.add_member_to_replica_set(&set, members, is_config_set)
                .await?;
            Ok(ResponseResult::Success)
        }
        NodeRequest::AddShardMember { name, address } => {
            ctl.add_shard_member(&name, &address).await?;
            Ok(ResponseResult::Success)
        }
        NodeRequest::IsMaster {
            is_config_set,
            set_name,
        } => Ok(ResponseResult::Master(
            ctl.query_is_master(is_config_set, &set_name).await?,
        )),
        NodeRequest::RebuildConnectionString => Ok(ResponseResult::ConnectionString(
            ctl.rebuild_connection_string().await?,
        )),

        NodeRequest::NodeStatus => Ok(ResponseResult::Status(ctl.status().await?)),
        NodeRequest::ListPrograms => Ok(ResponseResult::Programs(ctl.services_snapshot().await)),

        NodeRequest::Member(_) => Err(HerdError::NoSupport),
    }
}

fn transition(result: PromotionResult) -> ResponseResult {
    match result {
        Ok(outcome) => ResponseResult::Promotion(outcome),
        Err(e) => {
            warn!("role transition failed: {}", e);
            ResponseResult::TransitionFailed(e)
        }
    }
}
