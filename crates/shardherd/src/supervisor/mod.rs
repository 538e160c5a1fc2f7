//! Process supervisor backends.
//!
//! The controller never starts database processes itself. It stages
//! program definitions with a supervisor and then asks the supervisor to
//! reconcile the staged set with the running set.
//!
//! Two implementations are provided:
//! - `local`: in-memory staged/live maps for testing/development.
//! - `supervisord`: `[program:*]` sections in a supervisord conf file,
//!   applied with `supervisorctl update`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shardherd_proto::constants::MONGO_PROGRAM_MARKER;
use shardherd_proto::{HerdResult, ProgramDef};

/// Programs touched by a reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Trait that all process supervisor backends must implement.
///
/// `add_program` and `remove_program` only stage changes; nothing starts or
/// stops until `apply_changes`.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Human-readable name of this backend (e.g. "local", "supervisord").
    fn name(&self) -> &str;

    /// Stage `def`, replacing any program registered under the same name.
    async fn add_program(&self, def: &ProgramDef) -> HerdResult<()>;

    /// Stage removal of `name`. Removing an absent program is a no-op and
    /// returns `Ok(false)`.
    async fn remove_program(&self, name: &str) -> HerdResult<bool>;

    /// Reconcile the staged program set with the running processes,
    /// starting, stopping or restarting only what changed.
    async fn apply_changes(&self) -> HerdResult<ReconcileReport>;

    /// Registered (staged) database-related programs.
    async fn list_mongo_programs(&self) -> HerdResult<Vec<ProgramDef>>;
}

/// Whether a program is one of the database processes.
pub fn is_mongo_program(name: &str) -> bool {
    name.contains(MONGO_PROGRAM_MARKER)
}

pub mod local;
pub mod supervisord;
