//! In-memory process supervisor.
//!
//! Staged and "running" program sets are plain maps; `apply_changes`
//! copies the staged set over the running one and reports the diff. No
//! process is ever spawned.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use shardherd_proto::{HerdResult, ProgramDef};

use super::{is_mongo_program, ProcessSupervisor, ReconcileReport};

#[derive(Default)]
struct LocalState {
    staged: BTreeMap<String, ProgramDef>,
    running: BTreeMap<String, ProgramDef>,
    applies: u64,
}

/// A supervisor that only tracks definitions.
#[derive(Default)]
pub struct LocalSupervisor {
    state: RwLock<LocalState>,
}

impl LocalSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs as of the last `apply_changes`.
    #[cfg(test)]
    pub async fn running(&self) -> Vec<ProgramDef> {
        self.state.read().await.running.values().cloned().collect()
    }

    /// Number of `apply_changes` calls so far.
    #[cfg(test)]
    pub async fn apply_count(&self) -> u64 {
        self.state.read().await.applies
    }

    /// Register and start `def` immediately, as if it had been running
    /// before this supervisor was handed to the controller.
    #[cfg(test)]
    pub async fn preload(&self, def: ProgramDef) {
        let mut state = self.state.write().await;
        state.staged.insert(def.name.clone(), def.clone());
        state.running.insert(def.name.clone(), def);
    }
}

#[async_trait]
impl ProcessSupervisor for LocalSupervisor {
    fn name(&self) -> &str {
        "local"
    }

    async fn add_program(&self, def: &ProgramDef) -> HerdResult<()> {
        let mut state = self.state.write().await;
        debug!("local supervisor: stage add {}", def);
        state.staged.insert(def.name.clone(), def.clone());
        Ok(())
    }

    async fn remove_program(&self, name: &str) -> HerdResult<bool> {
        let mut state = self.state.write().await;
        let removed = state.staged.remove(name).is_some();
        if removed {
            debug!("local supervisor: stage remove {}", name);
        }
        Ok(removed)
    }

    async fn apply_changes(&self) -> HerdResult<ReconcileReport> {
        let mut state = self.state.write().await;
        let mut report = ReconcileReport::default();

        for (name, def) in &state.staged {
            match state.running.get(name) {
                None => report.added.push(name.clone()),
                Some(old) if old != def => report.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        for name in state.running.keys() {
            if !state.staged.contains_key(name) {
                report.removed.push(name.clone());
            }
        }

        state.running = state.staged.clone();
        state.applies += 1;
        info!(
            "local supervisor: applied (added={:?}, removed={:?}, changed={:?})",
            report.added, report.removed, report.changed
        );
        Ok(report)
    }

    async fn list_mongo_programs(&self) -> HerdResult<Vec<ProgramDef>> {
        let state = self.state.read().await;
        Ok(state
            .staged
            .values()
            .filter(|p| is_mongo_program(&p.name))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(name: &str, cmd: &str) -> ProgramDef {
        ProgramDef::database(name, cmd.split_whitespace().map(str::to_string).collect()).unwrap()
    }

    #[tokio::test]
    async fn test_local_supervisor_name() {
        assert_eq!(LocalSupervisor::new().name(), "local");
    }

    #[tokio::test]
    async fn test_changes_are_staged_until_apply() {
        let sup = LocalSupervisor::new();
        sup.add_program(&program("mongos", "mongos --configdb a:26050"))
            .await
            .unwrap();
        assert!(sup.running().await.is_empty());
        assert_eq!(sup.list_mongo_programs().await.unwrap().len(), 1);

        let report = sup.apply_changes().await.unwrap();
        assert_eq!(report.added, vec!["mongos"]);
        assert_eq!(sup.running().await.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_reports_diff() {
        let sup = LocalSupervisor::new();
        sup.preload(program("mongodb", "mongod --port 27017")).await;
        sup.preload(program("mongos", "mongos --configdb a:26050")).await;

        sup.remove_program("mongodb").await.unwrap();
        sup.add_program(&program("mongos", "mongos --configdb b:26050"))
            .await
            .unwrap();
        sup.add_program(&program("mongocfg", "mongod --configsvr"))
            .await
            .unwrap();

        let report = sup.apply_changes().await.unwrap();
        assert_eq!(report.added, vec!["mongocfg"]);
        assert_eq!(report.removed, vec!["mongodb"]);
        assert_eq!(report.changed, vec!["mongos"]);

        // Nothing staged since: a second apply is a no-op.
        assert!(sup.apply_changes().await.unwrap().is_noop());
        assert_eq!(sup.apply_count().await, 2);
    }

    #[tokio::test]
    async fn test_remove_twice_is_noop() {
        let sup = LocalSupervisor::new();
        sup.preload(program("mongodb", "mongod --port 27017")).await;
        assert!(sup.remove_program("mongodb").await.unwrap());
        assert!(!sup.remove_program("mongodb").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_non_mongo() {
        let sup = LocalSupervisor::new();
        sup.preload(program("webserver", "node server.js")).await;
        sup.preload(program("mongodb", "mongod --port 27017")).await;
        let names: Vec<String> = sup
            .list_mongo_programs()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["mongodb"]);
    }
}
