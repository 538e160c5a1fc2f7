//! Cluster membership API.
//!
//! Target of the broadcasts peers send after a role change. Senders do not
//! wait on these for correctness, so both entry points only touch local
//! state and are safe to repeat.

use std::sync::Arc;

use shardherd_proto::request::{MemberRequest, ResponseResult};
use shardherd_proto::HerdResult;
use tracing::{info, warn};

use crate::controller::TopologyController;
use crate::daemon::SystemStore;

pub struct ClusterMemberHandler {
    controller: Arc<TopologyController>,
    system_store: Arc<dyn SystemStore>,
}

impl ClusterMemberHandler {
    pub fn new(controller: Arc<TopologyController>, system_store: Arc<dyn SystemStore>) -> Self {
        Self {
            controller,
            system_store,
        }
    }

    /// Reload the shared system state.
    pub async fn on_system_state_reload(&self) -> HerdResult<u64> {
        self.system_store.load().await
    }

    /// A peer announced replica set `rs_name`; rebuild and adopt the local
    /// connection string.
    ///
    /// The locally persisted name wins over the announced one, which is
    /// only used when this node has none yet.
    pub async fn on_connection_string_updated(&self, rs_name: &str) -> HerdResult<String> {
        let local = match self.controller.reload_local_config().await {
            Ok(name) => name,
            Err(e) => {
                warn!("failed to reload local config: {}", e);
                self.controller.replica_set_name().await
            }
        };
        info!(
            "received update mongo string, rs_name={} local={:?}",
            rs_name, local
        );
        let announced = Some(rs_name).filter(|n| !n.trim().is_empty());
        let hint = local.as_deref().or(announced);
        self.controller.rebuild_connection_string_for(hint).await
    }
}

/// Handle a membership request.
pub async fn handle(handler: &ClusterMemberHandler, req: MemberRequest) -> HerdResult<ResponseResult> {
    match req {
        MemberRequest::LoadSystemStore => {
            handler.on_system_state_reload().await?;
            Ok(ResponseResult::Success)
        }
        MemberRequest::UpdateMongoConnectionString { rs_name } => Ok(
            ResponseResult::ConnectionString(handler.on_connection_string_updated(&rs_name).await?),
        ),
    }
}
