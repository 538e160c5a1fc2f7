//! Mesh broadcast channel.
//!
//! Sends the membership request to every configured peer over the peer
//! transport. Peers are contacted concurrently, one task per peer, each
//! bounded by its own deadline; the broadcast completes when every peer has
//! answered, failed, or timed out.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use shardherd_core::transport::PeerTransport;
use shardherd_proto::request::{MemberRequest, NodeRequest, PeerFailure, ResponseResult};
use shardherd_proto::{HerdError, HerdResult};

use super::{ClusterBroadcast, PublishReport};

/// Addresses under which peers may list this node.
///
/// The advertised address always counts. A wildcard listen address stands
/// for every local interface, so only the loopback addresses on the listen
/// port can be recognised without it.
pub fn own_addresses(listen: SocketAddr, advertise: Option<SocketAddr>) -> Vec<SocketAddr> {
    let mut own: Vec<SocketAddr> = advertise.into_iter().collect();
    if listen.ip().is_unspecified() {
        own.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), listen.port()));
        own.push(SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), listen.port()));
    } else {
        own.push(listen);
    }
    own.sort();
    own.dedup();
    own
}

/// Broadcast channel over a fixed peer list.
pub struct MeshBroadcast {
    peers: RwLock<BTreeSet<SocketAddr>>,
    transport: Arc<dyn PeerTransport>,
    timeout: Duration,
}

impl MeshBroadcast {
    /// `own` are this node's addresses (see [`own_addresses`]); peers
    /// matching any of them are never contacted.
    pub fn new(
        own: &[SocketAddr],
        peers: impl IntoIterator<Item = SocketAddr>,
        transport: Arc<dyn PeerTransport>,
        timeout: Duration,
    ) -> Self {
        let peers = peers
            .into_iter()
            .filter(|p| {
                let is_self = own.contains(p);
                if is_self {
                    debug!("dropping own address {} from the peer list", p);
                }
                !is_self
            })
            .collect();
        Self {
            peers: RwLock::new(peers),
            transport,
            timeout,
        }
    }
}

#[async_trait]
impl ClusterBroadcast for MeshBroadcast {
    fn name(&self) -> &str {
        "mesh"
    }

    async fn peers(&self) -> Vec<SocketAddr> {
        self.peers.read().await.iter().copied().collect()
    }

    async fn publish_to_cluster(&self, req: &MemberRequest) -> HerdResult<PublishReport> {
        let peers = self.peers().await;
        info!(
            "publishing {}.{} to {} peer(s) via {}",
            req.api(),
            req.method(),
            peers.len(),
            self.transport.name()
        );

        let mut pending: BTreeSet<SocketAddr> = peers.iter().copied().collect();
        let mut tasks = JoinSet::new();
        for peer in peers {
            let transport = self.transport.clone();
            let request = NodeRequest::Member(req.clone());
            let deadline = self.timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(deadline, transport.call(peer, request)).await
                {
                    Err(_) => Err(HerdError::Timeout),
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(resp)) => match resp.result {
                        ResponseResult::Error(e) => Err(e),
                        _ => Ok(()),
                    },
                };
                (peer, result)
            });
        }

        let mut report = PublishReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (peer, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!("broadcast task failed: {}", e);
                    continue;
                }
            };
            pending.remove(&peer);
            match result {
                Ok(()) => {
                    debug!("peer {} acknowledged {}", peer, req.method());
                    report.delivered.push(peer);
                }
                Err(error) => {
                    warn!("peer {} did not take {}: {}", peer, req.method(), error);
                    report.failed.push(PeerFailure { peer, error });
                }
            }
        }
        // peers whose task died without reporting back
        for peer in pending {
            report.failed.push(PeerFailure {
                peer,
                error: HerdError::Network("broadcast task aborted".to_string()),
            });
        }
        report.delivered.sort();
        report.failed.sort_by_key(|f| f.peer);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardherd_proto::request::NodeResponse;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    enum Behavior {
        Ack,
        Refuse,
        Unreachable,
        Hang,
        Crash,
    }

    /// In-process transport with a scripted behavior per peer.
    struct ScriptedTransport {
        behavior: HashMap<SocketAddr, Behavior>,
        calls: Mutex<Vec<(SocketAddr, NodeRequest)>>,
    }

    #[async_trait]
    impl PeerTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn call(&self, addr: SocketAddr, req: NodeRequest) -> HerdResult<NodeResponse> {
            self.calls.lock().await.push((addr, req));
            match self.behavior.get(&addr) {
                Some(Behavior::Ack) | None => Ok(NodeResponse::new(1, 1, ResponseResult::Success)),
                Some(Behavior::Refuse) => Ok(NodeResponse::error(
                    1,
                    1,
                    HerdError::Config("env file unreadable".to_string()),
                )),
                Some(Behavior::Unreachable) => {
                    Err(HerdError::Network("connection refused".to_string()))
                }
                Some(Behavior::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(HerdError::Timeout)
                }
                Some(Behavior::Crash) => panic!("transport state corrupted"),
            }
        }

        async fn shutdown(&self) -> HerdResult<()> {
            Ok(())
        }
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 7400))
    }

    fn mesh(behavior: Vec<(SocketAddr, Behavior)>) -> (MeshBroadcast, Arc<ScriptedTransport>) {
        let peers: Vec<SocketAddr> = behavior.iter().map(|(a, _)| *a).collect();
        let transport = Arc::new(ScriptedTransport {
            behavior: behavior.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        });
        let bc = MeshBroadcast::new(
            &[addr(1)],
            peers,
            transport.clone(),
            Duration::from_millis(200),
        );
        (bc, transport)
    }

    #[tokio::test]
    async fn test_publish_reaches_every_peer_but_self() {
        let (bc, transport) = mesh(vec![
            (addr(1), Behavior::Ack),
            (addr(2), Behavior::Ack),
            (addr(3), Behavior::Ack),
        ]);
        assert_eq!(bc.peers().await, vec![addr(2), addr(3)]);

        let req = MemberRequest::UpdateMongoConnectionString {
            rs_name: "rs1".to_string(),
        };
        let report = bc.publish_to_cluster(&req).await.unwrap();
        assert_eq!(report.delivered, vec![addr(2), addr(3)]);
        assert!(report.failed.is_empty());

        let calls = transport.calls.lock().await;
        assert_eq!(calls.len(), 2);
        assert!(calls
            .iter()
            .all(|(_, r)| *r == NodeRequest::Member(req.clone())));
    }

    #[tokio::test]
    async fn test_publish_collects_per_peer_failures() {
        let (bc, _) = mesh(vec![
            (addr(2), Behavior::Ack),
            (addr(3), Behavior::Refuse),
            (addr(4), Behavior::Unreachable),
            (addr(5), Behavior::Hang),
        ]);

        let report = bc
            .publish_to_cluster(&MemberRequest::LoadSystemStore)
            .await
            .unwrap();
        assert_eq!(report.delivered, vec![addr(2)]);
        let failed: Vec<(SocketAddr, HerdError)> = report
            .failed
            .into_iter()
            .map(|f| (f.peer, f.error))
            .collect();
        assert_eq!(failed.len(), 3);
        assert!(matches!(failed[0], (a, HerdError::Config(_)) if a == addr(3)));
        assert!(matches!(failed[1], (a, HerdError::Network(_)) if a == addr(4)));
        assert_eq!(failed[2], (addr(5), HerdError::Timeout));
    }

    #[tokio::test]
    async fn test_crashed_task_keeps_other_results() {
        let (bc, _) = mesh(vec![
            (addr(2), Behavior::Ack),
            (addr(3), Behavior::Crash),
            (addr(4), Behavior::Ack),
        ]);

        let report = bc
            .publish_to_cluster(&MemberRequest::LoadSystemStore)
            .await
            .unwrap();
        assert_eq!(report.delivered, vec![addr(2), addr(4)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].peer, addr(3));
        assert!(matches!(report.failed[0].error, HerdError::Network(_)));
    }

    #[tokio::test]
    async fn test_wildcard_bind_skips_advertised_self() {
        let listen = SocketAddr::from(([0, 0, 0, 0], 7400));
        let own = own_addresses(listen, Some(addr(1)));
        assert!(own.contains(&addr(1)));
        assert!(own.contains(&SocketAddr::from(([127, 0, 0, 1], 7400))));
        assert!(!own.contains(&listen));

        let transport = Arc::new(ScriptedTransport {
            behavior: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        });
        let bc = MeshBroadcast::new(
            &own,
            vec![addr(1), addr(2), SocketAddr::from(([127, 0, 0, 1], 7400))],
            transport.clone(),
            Duration::from_millis(200),
        );
        assert_eq!(bc.peers().await, vec![addr(2)]);
        assert_eq!(bc.name(), "mesh");

        bc.publish_to_cluster(&MemberRequest::LoadSystemStore)
            .await
            .unwrap();
        let calls = transport.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, addr(2));
    }

    #[test]
    fn test_own_addresses_for_specific_bind() {
        let listen = SocketAddr::from(([10, 0, 0, 1], 7400));
        assert_eq!(own_addresses(listen, None), vec![listen]);
        assert_eq!(own_addresses(listen, Some(listen)), vec![listen]);
    }
}
