//! Shardherd node daemon.
//!
//! Runs next to the database on every node and answers role-transition,
//! database and membership requests from operators and peers.
//!
//! Usage:
//!   shardherd [OPTIONS] <DIR>
//!
//! The daemon:
//! 1. Loads the node's persisted identity from `<DIR>/.env`
//! 2. Builds the supervisor, database client and broadcast backends
//! 3. Serves the node RPC protocol until SIGINT or shutdown

mod cluster;
mod config;
mod controller;
mod daemon;
mod dbclient;
mod fsutil;
mod ops;
mod request;
mod supervisor;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use shardherd_core::tcp_transport::TcpTransport;
use shardherd_core::transport::PeerTransport;
use shardherd_proto::defaults::{
    DEFAULT_BROADCAST_TIMEOUT_SECS, DEFAULT_MONGO_PATH, DEFAULT_MONGO_SHELL, DEFAULT_RPC_PORT,
    DEFAULT_SUPERVISORCTL, DEFAULT_SUPERVISOR_CONF, DEFAULT_TCP_MAX_CONNS_PER_PEER, ENV_FILE_NAME,
};

use crate::cluster::ClusterBroadcast;
use crate::controller::TopologyController;
use crate::daemon::{ConnectionState, NodeContext, SystemState};
use crate::dbclient::DatabaseClient;
use crate::ops::member::ClusterMemberHandler;
use crate::supervisor::ProcessSupervisor;

/// Shardherd node daemon
#[derive(Parser, Debug)]
#[command(name = "shardherd", version, about = "Cluster topology controller daemon")]
struct Args {
    /// Directory for the node's local config
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Listen address
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind_addr: String,

    /// Listen port
    #[arg(short = 'p', long, default_value_t = DEFAULT_RPC_PORT)]
    port: u16,

    /// Address peers use to reach this daemon. Entries of `--peer` matching
    /// it are skipped when broadcasting.
    #[arg(long, value_name = "HOST:PORT")]
    advertise_addr: Option<String>,

    /// Address of another node's daemon. Can be specified multiple times.
    #[arg(long = "peer", value_name = "HOST:PORT")]
    peers: Vec<String>,

    /// Per-peer broadcast timeout in seconds
    #[arg(long, default_value_t = DEFAULT_BROADCAST_TIMEOUT_SECS)]
    broadcast_timeout: u64,

    /// Process supervisor: "local" (in-memory) or "supervisord"
    #[arg(long, default_value = "local")]
    supervisor: String,

    /// supervisord configuration file holding the program sections
    #[arg(long, default_value = DEFAULT_SUPERVISOR_CONF)]
    supervisor_conf: PathBuf,

    /// supervisorctl binary
    #[arg(long, default_value = DEFAULT_SUPERVISORCTL)]
    supervisorctl: String,

    /// Database client: "local" (in-memory) or "shell"
    #[arg(long, default_value = "local")]
    db: String,

    /// mongo shell binary used by the "shell" database client
    #[arg(long, default_value = DEFAULT_MONGO_SHELL)]
    mongo_shell: String,

    /// Base directory of the database data directories
    #[arg(long, default_value = DEFAULT_MONGO_PATH)]
    mongo_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("shardherd v{} starting", env!("CARGO_PKG_VERSION"));

    let bind_addr: IpAddr = args.bind_addr.parse().unwrap_or_else(|_| {
        warn!("invalid bind address '{}', using 0.0.0.0", args.bind_addr);
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });
    let listen_addr = SocketAddr::new(bind_addr, args.port);

    if let Err(e) = tokio::fs::create_dir_all(&args.dir).await {
        error!("failed to create directory {}: {}", args.dir.display(), e);
        std::process::exit(1);
    }

    // ---------------------------------------------------------------
    // Collaborators
    // ---------------------------------------------------------------
    let supervisor: Arc<dyn ProcessSupervisor> = match args.supervisor.as_str() {
        "supervisord" => {
            info!(
                "using supervisord ({}, conf {})",
                args.supervisorctl,
                args.supervisor_conf.display()
            );
            Arc::new(supervisor::supervisord::Supervisord::new(
                args.supervisor_conf.clone(),
                args.supervisorctl.clone(),
            ))
        }
        other => {
            if other != "local" {
                warn!("unknown supervisor '{}', falling back to 'local'", other);
            }
            Arc::new(supervisor::local::LocalSupervisor::new())
        }
    };

    let db: Arc<dyn DatabaseClient> = match args.db.as_str() {
        "shell" => {
            info!("using mongo shell client ({})", args.mongo_shell);
            Arc::new(dbclient::shell::MongoShell::new(args.mongo_shell.clone()))
        }
        other => {
            if other != "local" {
                warn!("unknown database client '{}', falling back to 'local'", other);
            }
            Arc::new(dbclient::local::LocalDatabase::new(bind_addr.to_string()))
        }
    };

    let transport: Arc<dyn PeerTransport> =
        Arc::new(TcpTransport::new(DEFAULT_TCP_MAX_CONNS_PER_PEER));

    let peers = parse_peers(&args.peers).await;
    let broadcast: Arc<dyn ClusterBroadcast> = if peers.is_empty() {
        info!("no peers configured, using local broadcast (single-node mode)");
        Arc::new(cluster::local::LocalBroadcast::new())
    } else {
        let advertise = match &args.advertise_addr {
            Some(a) => resolve(a).await,
            None => None,
        };
        if advertise.is_none() && bind_addr.is_unspecified() {
            warn!(
                "listening on {} without --advertise-addr, this node may broadcast to itself",
                listen_addr
            );
        }
        let own = cluster::mesh::own_addresses(listen_addr, advertise);
        info!("using mesh broadcast with {} peer(s), own address(es) {:?}", peers.len(), own);
        Arc::new(cluster::mesh::MeshBroadcast::new(
            &own,
            peers,
            transport.clone(),
            Duration::from_secs(args.broadcast_timeout),
        ))
    };

    let local_config = Arc::new(config::EnvFile::new(args.dir.join(ENV_FILE_NAME)));
    let controller = Arc::new(TopologyController::new(
        supervisor,
        local_config,
        db,
        broadcast,
        Arc::new(ConnectionState::new()),
        args.mongo_path.clone(),
    ));

    if let Err(e) = controller.init().await {
        error!("controller init failed: {}", e);
        std::process::exit(1);
    }
    match controller.rebuild_connection_string().await {
        Ok(conn) => info!("connection string {}", conn),
        Err(e) => warn!("failed to build connection string: {}", e),
    }

    let member = ClusterMemberHandler::new(controller.clone(), Arc::new(SystemState::new()));
    let node = Arc::new(NodeContext::new(controller, member, listen_addr));

    info!("shardherd ready on {}", listen_addr);

    let node_accept = node.clone();
    tokio::spawn(async move {
        if let Err(e) = request::accept_loop(node_accept).await {
            error!("accept loop failed: {}", e);
        }
    });

    tokio::select! {
        _ = node.shutdown_notify.notified() => {
            info!("shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
        }
    }

    node.shutdown_notify.notify_waiters();
    if let Err(e) = transport.shutdown().await {
        warn!("transport shutdown failed: {}", e);
    }
    info!("shardherd stopped");
}

/// Resolve `--peer` arguments, skipping the ones that do not resolve.
async fn parse_peers(peers: &[String]) -> Vec<SocketAddr> {
    let mut addrs = Vec::new();
    for p in peers {
        if let Some(addr) = resolve(p).await {
            addrs.push(addr);
        }
    }
    addrs
}

async fn resolve(addr: &str) -> Option<SocketAddr> {
    match tokio::net::lookup_host(addr).await {
        Ok(mut resolved) => {
            let first = resolved.next();
            if first.is_none() {
                error!("address '{}' did not resolve", addr);
            }
            first
        }
        Err(e) => {
            error!("invalid address '{}': {}", addr, e);
            None
        }
    }
}
