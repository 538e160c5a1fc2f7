//! Tunable operational defaults.
//!
//! Cluster-contract values live in [`crate::constants`]. This module holds
//! the defaults that can be overridden via daemon flags.

use std::time::Duration;

// ─── Network / Port Defaults ────────────────────────────────────────────────

/// Default RPC port of the shardherd daemon.
pub const DEFAULT_RPC_PORT: u16 = 7400;

/// Maximum size of a single RPC frame (bytes). 4 MB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Default maximum pooled TCP connections per peer.
pub const DEFAULT_TCP_MAX_CONNS_PER_PEER: usize = 4;

// ─── Broadcast ──────────────────────────────────────────────────────────────

/// Per-peer deadline for a membership broadcast (seconds).
pub const DEFAULT_BROADCAST_TIMEOUT_SECS: u64 = 10;

/// Per-peer deadline for a membership broadcast.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(DEFAULT_BROADCAST_TIMEOUT_SECS);

// ─── Paths ──────────────────────────────────────────────────────────────────

/// Base path under which database data directories are provisioned.
pub const DEFAULT_MONGO_PATH: &str = "/var/lib/mongo/cluster";

/// Default supervisord configuration file.
pub const DEFAULT_SUPERVISOR_CONF: &str = "/etc/shardherd/supervisor.conf";

/// Default supervisorctl binary.
pub const DEFAULT_SUPERVISORCTL: &str = "supervisorctl";

/// Default mongo shell binary.
pub const DEFAULT_MONGO_SHELL: &str = "mongo";

/// File name of the persisted local config inside the data directory.
pub const ENV_FILE_NAME: &str = ".env";

// ─── Database Client ────────────────────────────────────────────────────────

/// Deadline for a single mongo shell invocation (seconds).
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 60;
