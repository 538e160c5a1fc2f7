//! Persisted local configuration.
//!
//! Node-local identity facts (notably the replica-set name) live in an
//! env-style `KEY=VALUE` file in the data directory, so a restarting node
//! reports the same cluster identity it had before.

use std::collections::BTreeMap;
#[cfg(test)]
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use shardherd_proto::{HerdError, HerdResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fsutil;

/// Durable key/value store for node-local facts.
#[async_trait]
pub trait LocalConfig: Send + Sync {
    /// Re-read the store. A missing store yields an empty map.
    async fn load(&self) -> HerdResult<BTreeMap<String, String>>;

    /// Durably set `key` to `value`.
    async fn set(&self, key: &str, value: &str) -> HerdResult<()>;
}

/// `KEY=VALUE` file, rewritten atomically on every `set`.
pub struct EnvFile {
    path: PathBuf,
    /// Serializes read-merge-write cycles in `set`.
    lock: Mutex<()>,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> HerdResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(parse_env(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no env file at {}, using defaults", self.path.display());
                Ok(BTreeMap::new())
            }
            Err(e) => Err(HerdError::Config(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl LocalConfig for EnvFile {
    async fn load(&self) -> HerdResult<BTreeMap<String, String>> {
        self.read_file().await
    }

    async fn set(&self, key: &str, value: &str) -> HerdResult<()> {
        if key.is_empty() || key.contains(['=', '\n']) || value.contains('\n') {
            return Err(HerdError::InvalidArgument(format!(
                "cannot persist {}={}",
                key, value
            )));
        }

        let _guard = self.lock.lock().await;
        // Merge with whatever is on disk so keys written by other tools survive.
        let mut merged = self.read_file().await?;
        merged.insert(key.to_string(), value.to_string());

        fsutil::atomic_write(&self.path, render_env(&merged).into_bytes())
            .await
            .map_err(|e| {
                warn!("failed to persist {}: {}", key, e);
                HerdError::Config(e.to_string())
            })?;

        debug!("persisted {}={}", key, value);
        Ok(())
    }
}

fn parse_env(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), unquote(v.trim()).to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

fn render_env(vars: &BTreeMap<String, String>) -> String {
    vars.iter().map(|(k, v)| format!("{}={}\n", k, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardherd_proto::constants::REPLICA_SET_KEY;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shardherd_config_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_parse_env() {
        let vars = parse_env("# comment\n\nA=1\nB = \"two\"\nbroken line\n=x\nC='3'\n");
        assert_eq!(vars.len(), 3);
        assert_eq!(vars["A"], "1");
        assert_eq!(vars["B"], "two");
        assert_eq!(vars["C"], "3");
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let tmp = scratch("missing");
        let env = EnvFile::new(tmp.join(".env"));
        let vars = env.load().await.unwrap();
        assert!(vars.is_empty());
        assert_eq!(vars.get(REPLICA_SET_KEY), None);
    }

    #[tokio::test]
    async fn test_set_survives_reload() {
        let tmp = scratch("reload");
        let path = tmp.join(".env");
        std::fs::create_dir_all(&tmp).unwrap();
        std::fs::write(&path, "ENDPOINT=10.0.0.1\n").unwrap();

        let env = EnvFile::new(&path);
        env.load().await.unwrap();
        env.set(REPLICA_SET_KEY, "rs1").await.unwrap();
        assert_eq!(env.load().await.unwrap()[REPLICA_SET_KEY], "rs1");

        let reopened = EnvFile::new(&path);
        let vars = reopened.load().await.unwrap();
        assert_eq!(vars[REPLICA_SET_KEY], "rs1");
        assert_eq!(vars["ENDPOINT"], "10.0.0.1");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn test_set_rejects_multiline() {
        let tmp = scratch("multiline");
        let env = EnvFile::new(tmp.join(".env"));
        assert!(env.set(REPLICA_SET_KEY, "a\nB=c").await.is_err());
        assert!(env.set("", "x").await.is_err());
    }
}
