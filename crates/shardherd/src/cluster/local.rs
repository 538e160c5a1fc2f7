//! Local (single-node) broadcast channel.
//!
//! There are no peers, so every broadcast trivially reaches all of them.

use std::net::SocketAddr;

use async_trait::async_trait;
use tracing::debug;

use shardherd_proto::request::MemberRequest;
use shardherd_proto::HerdResult;

use super::{ClusterBroadcast, PublishReport};

/// Broadcast channel of a node that is alone in its cluster.
#[derive(Debug, Default)]
pub struct LocalBroadcast;

impl LocalBroadcast {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterBroadcast for LocalBroadcast {
    fn name(&self) -> &str {
        "local"
    }

    async fn peers(&self) -> Vec<SocketAddr> {
        Vec::new()
    }

    async fn publish_to_cluster(&self, req: &MemberRequest) -> HerdResult<PublishReport> {
        debug!(
            "local broadcast: {}.{} has no peers to reach",
            req.api(),
            req.method()
        );
        Ok(PublishReport::default())
    }
}
