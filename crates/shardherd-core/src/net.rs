//! Async TCP helpers.

use shardherd_proto::{HerdError, HerdResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// Connect to a node by host name or address and port.
pub async fn connect_to(addr: &str, port: u16) -> HerdResult<TcpStream> {
    let target = format!("{}:{}", addr, port);
    debug!("connecting to {}", target);

    let stream = TcpStream::connect(&target)
        .await
        .map_err(|e| HerdError::Network(format!("connect {}: {}", target, e)))?;

    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Connect to a socket address.
pub async fn connect_to_addr(addr: SocketAddr) -> HerdResult<TcpStream> {
    debug!("connecting to {}", addr);
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| HerdError::Network(format!("connect {}: {}", addr, e)))?;

    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Create a TCP listener on the given address.
pub async fn create_listen_socket(addr: SocketAddr) -> HerdResult<TcpListener> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("failed to bind to {}: {}", addr, e);
        HerdError::Network(format!("bind {}: {}", addr, e))
    })?;

    debug!("listening on {}", addr);
    Ok(listener)
}
