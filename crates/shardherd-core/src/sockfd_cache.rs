//! Connection pool for reusing TCP connections to peer nodes.

use dashmap::DashMap;
use shardherd_proto::HerdResult;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;

/// A pool of TCP connections keyed by peer address.
pub struct SockfdCache {
    pool: Arc<DashMap<SocketAddr, Vec<TcpStream>>>,
    max_per_peer: usize,
}

impl SockfdCache {
    pub fn new(max_per_peer: usize) -> Self {
        Self {
            pool: Arc::new(DashMap::new()),
            max_per_peer,
        }
    }

    /// Get a cached connection to the given peer, or None.
    pub fn get(&self, addr: &SocketAddr) -> Option<TcpStream> {
        let mut entry = self.pool.get_mut(addr)?;
        entry.pop()
    }

    /// Return a connection to the pool for reuse.
    pub fn put(&self, addr: SocketAddr, stream: TcpStream) {
        let mut entry = self.pool.entry(addr).or_default();
        if entry.len() < self.max_per_peer {
            entry.push(stream);
        }
    }

    /// Get a connection, creating a new one if none cached.
    pub async fn get_or_connect(&self, addr: SocketAddr) -> HerdResult<TcpStream> {
        if let Some(stream) = self.get(&addr) {
            return Ok(stream);
        }
        crate::net::connect_to_addr(addr).await
    }

    /// Number of idle connections held for a peer.
    pub fn idle(&self, addr: &SocketAddr) -> usize {
        self.pool.get(addr).map(|e| e.len()).unwrap_or(0)
    }

    /// Clear all cached connections for a peer.
    pub fn clear_peer(&self, addr: &SocketAddr) {
        self.pool.remove(addr);
    }

    /// Clear all cached connections.
    pub fn clear_all(&self) {
        self.pool.clear();
    }
}
