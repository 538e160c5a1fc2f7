//! Cluster topology controller.
//!
//! Moves the local database process between roles. Every promotion is a
//! fixed pipeline of steps run strictly in order:
//!
//!   validate → remove previous → provision data dir → register program
//!   → persist identity → broadcast → apply changes
//!
//! The first failing step ends the promotion with a [`StepError`] naming
//! it; completed steps are not rolled back, and re-running the same
//! promotion is the recovery path. The broadcast is the exception: its
//! result is returned in [`PromotionOutcome::propagation`] and never stops
//! the pipeline, so the local process is started even when peers could not
//! be told about it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use shardherd_proto::constants::{
    CFG_DIR_NAME, CFG_PORT, CFG_RSET_NAME, MONGOD_BIN, MONGOS_BIN, REPLICA_DIR_SUFFIX,
    REPLICA_SET_KEY, ROUTER_PORT, SHARD_SRV_PORT, STANDALONE_PROGRAM,
};
use shardherd_proto::error::AtStep;
use shardherd_proto::request::NodeStatus;
use shardherd_proto::{
    ClusterNodeRole, HerdError, HerdResult, MasterStatus, MemberRequest, ProgramDef,
    PromotionOutcome, Propagation, ReplicaSetIdentity, RouterConfig, ShardTopology, StepError,
    TransitionStep,
};

use crate::cluster::ClusterBroadcast;
use crate::config::LocalConfig;
use crate::daemon::ConnectionSink;
use crate::dbclient::DatabaseClient;
use crate::fsutil;
use crate::supervisor::ProcessSupervisor;

/// Result of a role transition: local commit or the step that failed.
pub type PromotionResult = Result<PromotionOutcome, StepError>;

/// Owns role transitions of the local database process.
pub struct TopologyController {
    supervisor: Arc<dyn ProcessSupervisor>,
    local_config: Arc<dyn LocalConfig>,
    db: Arc<dyn DatabaseClient>,
    broadcast: Arc<dyn ClusterBroadcast>,
    connections: Arc<dyn ConnectionSink>,
    /// Base directory of every role's data directory.
    mongo_path: PathBuf,
    /// Replica-set name as last loaded or persisted.
    replica_set: RwLock<Option<String>>,
    /// Mongo programs as of the last refresh. Status only.
    snapshot: RwLock<Vec<ProgramDef>>,
    /// Serializes promotions issued to this instance.
    transition: Mutex<()>,
}

impl TopologyController {
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        local_config: Arc<dyn LocalConfig>,
        db: Arc<dyn DatabaseClient>,
        broadcast: Arc<dyn ClusterBroadcast>,
        connections: Arc<dyn ConnectionSink>,
        mongo_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            supervisor,
            local_config,
            db,
            broadcast,
            connections,
            mongo_path: mongo_path.into(),
            replica_set: RwLock::new(None),
            snapshot: RwLock::new(Vec::new()),
            transition: Mutex::new(()),
        }
    }

    /// Load persisted identity and refresh the services snapshot.
    ///
    /// An unreadable local config is logged and treated as empty.
    pub async fn init(&self) -> HerdResult<()> {
        info!(
            "initializing topology controller (supervisor={}, db={}, broadcast={})",
            self.supervisor.name(),
            self.db.name(),
            self.broadcast.name()
        );
        if let Err(e) = self.reload_local_config().await {
            warn!("failed to load local config, starting without identity: {}", e);
        }
        self.refresh_services().await?;
        Ok(())
    }

    /// Re-read the persisted replica-set name.
    pub async fn reload_local_config(&self) -> HerdResult<Option<String>> {
        let vars = self.local_config.load().await?;
        let name = replica_set_from(&vars);
        debug!("local config loaded, {}={:?}", REPLICA_SET_KEY, name);
        *self.replica_set.write().await = name.clone();
        Ok(name)
    }

    /// Replica-set name this node belongs to, if any.
    pub async fn replica_set_name(&self) -> Option<String> {
        self.replica_set.read().await.clone()
    }

    /// Cached list of registered mongo programs.
    pub async fn services_snapshot(&self) -> Vec<ProgramDef> {
        self.snapshot.read().await.clone()
    }

    async fn refresh_services(&self) -> HerdResult<Vec<ProgramDef>> {
        let programs = self.supervisor.list_mongo_programs().await?;
        debug!("services snapshot: {} mongo program(s)", programs.len());
        *self.snapshot.write().await = programs.clone();
        Ok(programs)
    }

    // ─── Role transitions ────────────────────────────────────────────────

    /// Turn this node into a member of replica set `name` and announce the
    /// set to the rest of the cluster.
    pub async fn promote_to_replica_member(&self, name: &str, first_shard: bool) -> PromotionResult {
        let name = validate_set_name(name).at(TransitionStep::Validate)?;
        let dbpath = self.replica_member_path(name);
        let program = replica_member_program(name, &dbpath).at(TransitionStep::Validate)?;

        let _guard = self.transition.lock().await;
        info!("promoting to replica member of {} (first_shard={})", name, first_shard);

        let registered = self
            .is_registered(&program)
            .await
            .at(TransitionStep::RemovePrevious)?;
        let removed = self
            .remove_data_roles(&program.name)
            .await
            .at(TransitionStep::RemovePrevious)?;
        self.provision(&dbpath, first_shard || registered)
            .await
            .at(TransitionStep::ProvisionDataDir)?;
        self.register(&program)
            .await
            .at(TransitionStep::RegisterProgram)?;
        self.persist_replica_set(name)
            .await
            .at(TransitionStep::PersistIdentity)?;

        let propagation = self
            .announce(MemberRequest::UpdateMongoConnectionString {
                rs_name: name.to_string(),
            })
            .await;

        self.apply().await.at(TransitionStep::ApplyChanges)?;
        Ok(PromotionOutcome {
            role: ClusterNodeRole::ReplicaMember,
            program,
            removed,
            propagation,
        })
    }

    /// Turn this node into a shard server of shard `name`.
    ///
    /// The shard's identity lives in the database, so nothing is persisted
    /// or broadcast.
    pub async fn promote_to_shard_server(&self, name: &str, first_shard: bool) -> PromotionResult {
        let name = validate_set_name(name).at(TransitionStep::Validate)?;
        let dbpath = self.mongo_path.join(name);
        let program = shard_server_program(name, &dbpath).at(TransitionStep::Validate)?;

        let _guard = self.transition.lock().await;
        info!("promoting to shard server {} (first_shard={})", name, first_shard);

        let registered = self
            .is_registered(&program)
            .await
            .at(TransitionStep::RemovePrevious)?;
        let removed = self
            .remove_data_roles(&program.name)
            .await
            .at(TransitionStep::RemovePrevious)?;
        self.provision(&dbpath, first_shard || registered)
            .await
            .at(TransitionStep::ProvisionDataDir)?;
        self.register(&program)
            .await
            .at(TransitionStep::RegisterProgram)?;
        self.apply().await.at(TransitionStep::ApplyChanges)?;

        Ok(PromotionOutcome {
            role: ClusterNodeRole::ShardServer,
            program,
            removed,
            propagation: Propagation::NotRequired,
        })
    }

    /// (Re)start the router against the given config servers.
    ///
    /// The previous router definition is always removed first, so a stale
    /// `--configdb` never survives a reconfiguration.
    pub async fn configure_router(&self, config_servers: &[String]) -> PromotionResult {
        let router =
            RouterConfig::from_config_servers(config_servers).at(TransitionStep::Validate)?;
        let program = router_program(&router).at(TransitionStep::Validate)?;

        let _guard = self.transition.lock().await;
        info!("configuring router, configdb={}", router.configdb());

        let removed = self
            .remove_companion(&program.name)
            .await
            .at(TransitionStep::RemovePrevious)?;
        self.register(&program)
            .await
            .at(TransitionStep::RegisterProgram)?;
        self.apply().await.at(TransitionStep::ApplyChanges)?;

        Ok(PromotionOutcome {
            role: ClusterNodeRole::Router,
            program,
            removed,
            propagation: Propagation::NotRequired,
        })
    }

    /// Start a config server on a brand-new data directory. A config server
    /// that is already registered as-is keeps its data.
    pub async fn promote_to_config_server(&self) -> PromotionResult {
        let dbpath = self.mongo_path.join(CFG_DIR_NAME);
        let program = config_server_program(&dbpath).at(TransitionStep::Validate)?;

        let _guard = self.transition.lock().await;
        info!("promoting to config server of {}", CFG_RSET_NAME);

        let registered = self
            .is_registered(&program)
            .await
            .at(TransitionStep::RemovePrevious)?;
        let removed = self
            .remove_companion(&program.name)
            .await
            .at(TransitionStep::RemovePrevious)?;
        self.provision(&dbpath, registered)
            .await
            .at(TransitionStep::ProvisionDataDir)?;
        self.register(&program)
            .await
            .at(TransitionStep::RegisterProgram)?;
        self.apply().await.at(TransitionStep::ApplyChanges)?;

        Ok(PromotionOutcome {
            role: ClusterNodeRole::ConfigServer,
            program,
            removed,
            propagation: Propagation::NotRequired,
        })
    }

    // ─── Pipeline steps ──────────────────────────────────────────────────

    /// Remove the standalone program and every other data-role program, so
    /// that `keep` is the only data role left once it is registered.
    async fn remove_data_roles(&self, keep: &str) -> HerdResult<Vec<String>> {
        let mut removed = Vec::new();
        if self.supervisor.remove_program(STANDALONE_PROGRAM).await? {
            removed.push(STANDALONE_PROGRAM.to_string());
        }
        for def in self.supervisor.list_mongo_programs().await? {
            let data_role = def.role().map_or(false, ClusterNodeRole::is_data_role);
            if !data_role || def.name == keep {
                continue;
            }
            if self.supervisor.remove_program(&def.name).await? {
                removed.push(def.name);
            }
        }
        if !removed.is_empty() {
            info!("removed previous data role program(s): {:?}", removed);
        }
        Ok(removed)
    }

    async fn remove_companion(&self, name: &str) -> HerdResult<Vec<String>> {
        if self.supervisor.remove_program(name).await? {
            debug!("removed previous {} definition", name);
            Ok(vec![name.to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    /// Whether exactly `program` is already registered. Its process keeps
    /// running across a reconcile, so its data directory must not be
    /// recreated underneath it.
    async fn is_registered(&self, program: &ProgramDef) -> HerdResult<bool> {
        let registered = self
            .supervisor
            .list_mongo_programs()
            .await?
            .iter()
            .any(|def| def == program);
        if registered {
            info!("{} is already registered, keeping its data", program.name);
        }
        Ok(registered)
    }

    async fn provision(&self, dbpath: &Path, reuse: bool) -> HerdResult<()> {
        if reuse {
            info!("reusing existing data at {}", dbpath.display());
            if fsutil::is_empty_dir(dbpath).await? {
                warn!("reused data directory {} is empty", dbpath.display());
            }
            return Ok(());
        }
        fsutil::create_fresh_path(dbpath).await
    }

    async fn register(&self, program: &ProgramDef) -> HerdResult<()> {
        debug!("registering {}", program);
        self.supervisor.add_program(program).await
    }

    async fn persist_replica_set(&self, name: &str) -> HerdResult<()> {
        self.local_config.set(REPLICA_SET_KEY, name).await?;
        *self.replica_set.write().await = Some(name.to_string());
        Ok(())
    }

    /// Broadcast `req`; the outcome is reported, never raised.
    async fn announce(&self, req: MemberRequest) -> Propagation {
        let propagation = match self.broadcast.publish_to_cluster(&req).await {
            Ok(report) => report.into_propagation(),
            Err(e) => Propagation::Failed {
                failed: Vec::new(),
                reason: Some(e),
            },
        };
        if propagation.is_complete() {
            debug!("{}.{} delivered to every peer", req.api(), req.method());
        } else {
            warn!(
                "{}.{} not delivered to every peer: {:?}",
                req.api(),
                req.method(),
                propagation
            );
        }
        propagation
    }

    async fn apply(&self) -> HerdResult<()> {
        let report = self.supervisor.apply_changes().await?;
        if report.is_noop() {
            debug!("supervisor had no pending changes");
        }
        if let Err(e) = self.refresh_services().await {
            warn!("failed to refresh services snapshot: {}", e);
        }
        Ok(())
    }

    fn replica_member_path(&self, name: &str) -> PathBuf {
        self.mongo_path.join(format!("{}{}", name, REPLICA_DIR_SUFFIX))
    }

    // ─── Database pass-through ───────────────────────────────────────────

    pub async fn initiate_replica_set(
        &self,
        set: &str,
        members: Vec<String>,
        is_config_set: bool,
    ) -> HerdResult<()> {
        let identity = ReplicaSetIdentity::new(set, members, is_config_set)?;
        info!(
            "initiate replica set {} members={:?} config={}",
            identity.name, identity.members, is_config_set
        );
        self.db.initiate_replica_set(&identity).await
    }

    pub async fn add_member_to_replica_set(
        &self,
        set: &str,
        members: Vec<String>,
        is_config_set: bool,
    ) -> HerdResult<()> {
        let identity = ReplicaSetIdentity::new(set, members, is_config_set)?;
        info!(
            "update replica set {} members={:?} config={}",
            identity.name, identity.members, is_config_set
        );
        self.db.replica_update_members(&identity).await
    }

    pub async fn add_shard_member(&self, name: &str, address: &str) -> HerdResult<()> {
        let name = validate_set_name(name)?;
        if address.trim().is_empty() {
            return Err(HerdError::InvalidArgument(format!(
                "shard {} needs a member address",
                name
            )));
        }
        info!("add shard {} at {}", name, address);
        let shard = ShardTopology {
            name: name.to_string(),
            seed: address.to_string(),
            first_shard: false,
        };
        self.db.add_shard(&shard).await
    }

    pub async fn query_is_master(
        &self,
        is_config_set: bool,
        set_name: &str,
    ) -> HerdResult<MasterStatus> {
        self.db.is_master(is_config_set, set_name).await
    }

    /// Rebuild the connection string from the local replica-set name and
    /// hand it to the database-access layer.
    pub async fn rebuild_connection_string(&self) -> HerdResult<String> {
        let rs_name = self.replica_set_name().await;
        self.rebuild_connection_string_for(rs_name.as_deref()).await
    }

    pub(crate) async fn rebuild_connection_string_for(
        &self,
        rs_name: Option<&str>,
    ) -> HerdResult<String> {
        let conn = self.db.update_connection_string(rs_name).await?;
        self.connections.adopt(&conn).await?;
        Ok(conn)
    }

    // ─── Status ──────────────────────────────────────────────────────────

    /// Roles and programs as registered with the supervisor right now.
    pub async fn status(&self) -> HerdResult<NodeStatus> {
        let programs = self.refresh_services().await?;
        let mut roles: Vec<ClusterNodeRole> = programs.iter().filter_map(ProgramDef::role).collect();
        roles.dedup();
        Ok(NodeStatus {
            roles,
            replica_set_name: self.replica_set_name().await,
            connection_string: self.connections.current().await,
            programs,
        })
    }
}

fn replica_set_from(vars: &BTreeMap<String, String>) -> Option<String> {
    vars.get(REPLICA_SET_KEY)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_set_name(name: &str) -> HerdResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HerdError::InvalidArgument(
            "name must be supplied".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(HerdError::InvalidArgument(format!(
            "invalid set name '{}'",
            name
        )));
    }
    Ok(name)
}

// ─── Program definitions ─────────────────────────────────────────────────

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn dbpath_arg(dbpath: &Path) -> String {
    dbpath.to_string_lossy().into_owned()
}

fn replica_member_program(name: &str, dbpath: &Path) -> HerdResult<ProgramDef> {
    let port = SHARD_SRV_PORT.to_string();
    let dbpath = dbpath_arg(dbpath);
    ProgramDef::database(
        ClusterNodeRole::ReplicaMember.program_name(name),
        args(&[MONGOD_BIN, "--replSet", name, "--port", &port, "--dbpath", &dbpath]),
    )
}

fn shard_server_program(name: &str, dbpath: &Path) -> HerdResult<ProgramDef> {
    let port = SHARD_SRV_PORT.to_string();
    let dbpath = dbpath_arg(dbpath);
    ProgramDef::database(
        ClusterNodeRole::ShardServer.program_name(name),
        args(&[
            MONGOD_BIN, "--shardsvr", "--replSet", name, "--port", &port, "--dbpath", &dbpath,
        ]),
    )
}

fn router_program(router: &RouterConfig) -> HerdResult<ProgramDef> {
    let configdb = router.configdb();
    let port = ROUTER_PORT.to_string();
    ProgramDef::database(
        ClusterNodeRole::Router.program_name(""),
        args(&[MONGOS_BIN, "--configdb", &configdb, "--port", &port]),
    )
}

fn config_server_program(dbpath: &Path) -> HerdResult<ProgramDef> {
    let port = CFG_PORT.to_string();
    let dbpath = dbpath_arg(dbpath);
    ProgramDef::database(
        ClusterNodeRole::ConfigServer.program_name(CFG_RSET_NAME),
        args(&[
            MONGOD_BIN, "--configsvr", "--replSet", CFG_RSET_NAME, "--port", &port, "--dbpath",
            &dbpath,
        ]),
    )
}
