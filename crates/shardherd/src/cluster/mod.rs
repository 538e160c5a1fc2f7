//! Cluster broadcast channels.
//!
//! A broadcast invokes one membership-API method on every other node of
//! the cluster and reports, per peer, whether it was delivered. Delivery is
//! best effort: a failed peer never fails the broadcast as a whole.
//!
//! Two implementations are provided:
//! - `local`: single-node driver with no peers.
//! - `mesh`: fan-out over the peer transport to a configured peer list.

use std::net::SocketAddr;

use async_trait::async_trait;
use shardherd_proto::request::{MemberRequest, PeerFailure, Propagation};
use shardherd_proto::HerdResult;

/// Per-peer outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: Vec<SocketAddr>,
    pub failed: Vec<PeerFailure>,
}

impl PublishReport {
    /// Fold the report into the propagation status returned to callers.
    pub fn into_propagation(self) -> Propagation {
        match (self.delivered.is_empty(), self.failed.is_empty()) {
            (_, true) => Propagation::Complete {
                peers: self.delivered,
            },
            (false, false) => Propagation::Partial {
                delivered: self.delivered,
                failed: self.failed,
            },
            (true, false) => Propagation::Failed {
                failed: self.failed,
                reason: None,
            },
        }
    }
}

/// Trait that all broadcast backends must implement.
#[async_trait]
pub trait ClusterBroadcast: Send + Sync {
    /// Human-readable name of this backend (e.g. "local", "mesh").
    fn name(&self) -> &str;

    /// Every known node except this one.
    async fn peers(&self) -> Vec<SocketAddr>;

    /// Invoke `req` on every peer.
    ///
    /// An `Err` means the broadcast could not be attempted at all; per-peer
    /// failures are reported in the `PublishReport`.
    async fn publish_to_cluster(&self, req: &MemberRequest) -> HerdResult<PublishReport>;
}

pub mod local;
pub mod mesh;
