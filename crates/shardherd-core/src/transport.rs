//! Peer transport abstraction.
//!
//! The cluster broadcast reaches other nodes through `PeerTransport`, so
//! tests can replace the network with an in-process implementation.

use std::net::SocketAddr;

use async_trait::async_trait;
use shardherd_proto::request::{NodeRequest, NodeResponse};
use shardherd_proto::HerdResult;

/// Abstraction over node-to-node request/response RPC.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Send a request to a peer and await the response.
    ///
    /// Transport failures are returned as errors; an error carried inside
    /// the response is left for the caller to interpret.
    async fn call(&self, addr: SocketAddr, req: NodeRequest) -> HerdResult<NodeResponse>;

    /// Shut down the transport, releasing pooled connections.
    async fn shutdown(&self) -> HerdResult<()>;
}
