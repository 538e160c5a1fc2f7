//! Per-node daemon state.
//!
//! One `NodeContext` is built at startup and shared by every connection
//! task. It owns the topology controller and the membership handler, plus
//! the two local collaborators they notify: the connection sink used by the
//! node's database-access layer and the system-state cache.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use shardherd_proto::HerdResult;

use crate::controller::TopologyController;
use crate::ops::member::ClusterMemberHandler;

/// Shared daemon state handed to every request.
pub type SharedNode = Arc<NodeContext>;

pub struct NodeContext {
    pub controller: Arc<TopologyController>,
    pub member: ClusterMemberHandler,
    /// Listen address for RPC connections.
    pub listen_addr: SocketAddr,
    /// Notify channel for shutdown.
    pub shutdown_notify: Arc<Notify>,
}

impl NodeContext {
    pub fn new(
        controller: Arc<TopologyController>,
        member: ClusterMemberHandler,
        listen_addr: SocketAddr,
    ) -> Self {
        Self {
            controller,
            member,
            listen_addr,
            shutdown_notify: Arc::new(Notify::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Local database-access layer
// ---------------------------------------------------------------------------

/// The node's database-access layer, as seen by the controller.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Switch to `conn`. Returns whether it differs from the previous one.
    async fn adopt(&self, conn: &str) -> HerdResult<bool>;

    /// Connection string currently in use.
    async fn current(&self) -> Option<String>;
}

/// Holds the adopted connection string.
#[derive(Default)]
pub struct ConnectionState {
    current: RwLock<Option<String>>,
    changes: AtomicU64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a different connection string was adopted.
    #[cfg(test)]
    pub fn changes(&self) -> u64 {
        self.changes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectionSink for ConnectionState {
    async fn adopt(&self, conn: &str) -> HerdResult<bool> {
        let mut current = self.current.write().await;
        if current.as_deref() == Some(conn) {
            debug!("connection string unchanged: {}", conn);
            return Ok(false);
        }
        info!("adopting connection string {}", conn);
        *current = Some(conn.to_string());
        self.changes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn current(&self) -> Option<String> {
        self.current.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// System-state cache
// ---------------------------------------------------------------------------

/// Cache of shared cluster metadata kept in the database.
#[async_trait]
pub trait SystemStore: Send + Sync {
    /// Drop cached state and reload it. Returns the new generation.
    async fn load(&self) -> HerdResult<u64>;
}

/// Tracks how often and when the system state was reloaded.
#[derive(Default)]
pub struct SystemState {
    generation: AtomicU64,
    loaded_at: RwLock<Option<SystemTime>>,
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub async fn loaded_at(&self) -> Option<SystemTime> {
        *self.loaded_at.read().await
    }
}

#[async_trait]
impl SystemStore for SystemState {
    async fn load(&self) -> HerdResult<u64> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let now = SystemTime::now();
        let previous = self.loaded_at.write().await.replace(now);
        match previous.and_then(|t| now.duration_since(t).ok()) {
            Some(age) => info!(
                "system state reloaded, generation={} (previous load {:?} ago)",
                generation, age
            ),
            None => info!("system state reloaded, generation={}", generation),
        }
        Ok(generation)
    }
}
