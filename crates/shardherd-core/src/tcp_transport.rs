//! TCP-based peer transport.
//!
//! Uses [`SockfdCache`] so repeated broadcasts to the same peer reuse an
//! established connection. A connection that failed mid-call is discarded
//! rather than returned to the pool.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tracing::debug;

use shardherd_proto::constants::HERD_PROTO_VER;
use shardherd_proto::request::{NodeRequest, NodeResponse, RequestHeader};
use shardherd_proto::HerdResult;

use crate::frame;
use crate::sockfd_cache::SockfdCache;
use crate::transport::PeerTransport;

/// TCP-based peer transport with connection pooling.
pub struct TcpTransport {
    cache: SockfdCache,
    next_id: AtomicU32,
}

impl TcpTransport {
    /// `max_conns_per_peer` controls the pool size per peer.
    pub fn new(max_conns_per_peer: usize) -> Self {
        Self {
            cache: SockfdCache::new(max_conns_per_peer),
            next_id: AtomicU32::new(1),
        }
    }

    fn header(&self) -> RequestHeader {
        RequestHeader {
            proto_ver: HERD_PROTO_VER,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn call(&self, addr: SocketAddr, req: NodeRequest) -> HerdResult<NodeResponse> {
        let header = self.header();
        let mut stream = self.cache.get_or_connect(addr).await?;

        match frame::call(&mut stream, &header, &req).await {
            Ok(resp) => {
                self.cache.put(addr, stream);
                Ok(resp)
            }
            Err(e) => {
                debug!("call to {} failed, dropping pooled connections: {}", addr, e);
                self.cache.clear_peer(&addr);
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> HerdResult<()> {
        self.cache.clear_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardherd_proto::request::ResponseResult;
    use shardherd_proto::HerdError;
    use tokio::net::TcpListener;

    /// Answer every request on one connection with `Success`.
    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            while let Ok(Some((header, _req))) =
                frame::read_frame::<_, (RequestHeader, NodeRequest)>(&mut stream).await
            {
                let resp = NodeResponse::new(header.proto_ver, header.id, ResponseResult::Success);
                frame::write_frame(&mut stream, &resp).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_tcp_transport_reuses_connection() {
        let addr = echo_server().await;
        let transport = TcpTransport::new(2);
        assert_eq!(transport.name(), "tcp");

        let first = transport.call(addr, NodeRequest::NodeStatus).await.unwrap();
        assert!(first.is_success());
        assert_eq!(transport.cache.idle(&addr), 1);

        // The echo server accepts a single connection, so the second call
        // only succeeds over the pooled stream.
        let second = transport.call(addr, NodeRequest::ListPrograms).await.unwrap();
        assert!(second.is_success());
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_tcp_transport_unreachable_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(2);
        let result = transport.call(addr, NodeRequest::NodeStatus).await;
        assert!(matches!(result, Err(HerdError::Network(_))));
        assert_eq!(transport.cache.idle(&addr), 0);
    }
}
