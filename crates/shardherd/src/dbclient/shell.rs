//! mongo shell database client.
//!
//! Each operation is a short script passed to `mongo --quiet --eval`. The
//! script prints a single `JSON.stringify`-ed reply on its last output line,
//! which is checked for `ok: 1`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use shardherd_proto::constants::{CFG_PORT, ROUTER_PORT, SHARD_SRV_PORT};
use shardherd_proto::defaults::DEFAULT_SHELL_TIMEOUT_SECS;
use shardherd_proto::{HerdError, HerdResult, MasterStatus, ReplicaSetIdentity, ShardTopology};

use super::{build_connection_string, DatabaseClient};

/// Database client that shells out to the `mongo` binary.
pub struct MongoShell {
    shell_bin: String,
    host: String,
    timeout: Duration,
}

impl MongoShell {
    pub fn new(shell_bin: impl Into<String>) -> Self {
        Self {
            shell_bin: shell_bin.into(),
            host: "127.0.0.1".to_string(),
            timeout: Duration::from_secs(DEFAULT_SHELL_TIMEOUT_SECS),
        }
    }

    /// Run `script` against the process listening on `port` and return its
    /// reply document.
    async fn eval(&self, port: u16, script: &str) -> HerdResult<Value> {
        debug!("mongo shell on port {}: {}", port, script);
        let mut cmd = Command::new(&self.shell_bin);
        cmd.arg("--quiet")
            .arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(port.to_string())
            .arg("--eval")
            .arg(script)
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| HerdError::Timeout)?
            .map_err(|e| HerdError::Database(format!("spawn {}: {}", self.shell_bin, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("mongo shell exited with {}: {}", output.status, stderr.trim());
            return Err(HerdError::Database(format!(
                "mongo shell exited with {}: {} {}",
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }
        parse_reply(&stdout)
    }
}

fn js_str(s: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    Value::String(s.to_string()).to_string()
}

fn js_str_array(items: &[String]) -> String {
    Value::Array(items.iter().cloned().map(Value::String).collect()).to_string()
}

fn initiate_script(set: &ReplicaSetIdentity) -> String {
    format!(
        "var hosts = {hosts};\
         var cfg = {{_id: {name}, configsvr: {cfgsvr}, members: hosts.map(function(h, i) {{ return {{_id: i, host: h}}; }})}};\
         print(JSON.stringify(rs.initiate(cfg)));",
        hosts = js_str_array(&set.member_hosts()),
        name = js_str(&set.name),
        cfgsvr = set.is_config_set,
    )
}

/// Reconfigure with a bumped version, keeping the `_id` of members that
/// stay in the set.
fn reconfig_script(set: &ReplicaSetIdentity) -> String {
    format!(
        "var hosts = {hosts};\
         var cfg = rs.conf();\
         if (cfg._id !== {name}) {{ throw new Error('connected to ' + cfg._id + ', expected ' + {name}); }}\
         var old = {{}};\
         var next = 0;\
         cfg.members.forEach(function(m) {{ old[m.host] = m._id; next = Math.max(next, m._id + 1); }});\
         cfg.members = hosts.map(function(h) {{ return {{_id: (h in old) ? old[h] : next++, host: h}}; }});\
         cfg.version += 1;\
         print(JSON.stringify(rs.reconfig(cfg)));",
        hosts = js_str_array(&set.member_hosts()),
        name = js_str(&set.name),
    )
}

fn add_shard_script(shard: &ShardTopology) -> String {
    format!(
        "print(JSON.stringify(sh.addShard({})));",
        js_str(&shard.shard_host())
    )
}

const IS_MASTER_SCRIPT: &str = "print(JSON.stringify(db.isMaster()));";

/// Decode the reply document from the last non-empty output line.
fn parse_reply(stdout: &str) -> HerdResult<Value> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| HerdError::Database("empty reply from mongo shell".to_string()))?;
    let reply: Value = serde_json::from_str(line)
        .map_err(|e| HerdError::Database(format!("unparsable reply '{}': {}", line, e)))?;

    if reply.get("ok").and_then(Value::as_f64) == Some(1.0) {
        Ok(reply)
    } else {
        let msg = reply
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("command failed");
        Err(HerdError::Database(msg.to_string()))
    }
}

fn parse_master(reply: &Value, set_name: &str) -> HerdResult<MasterStatus> {
    let reported = reply.get("setName").and_then(Value::as_str);
    if reported != Some(set_name) {
        return Err(HerdError::Database(format!(
            "member belongs to replica set {:?}, expected {}",
            reported, set_name
        )));
    }
    Ok(MasterStatus {
        is_master: reply.get("ismaster").and_then(Value::as_bool).unwrap_or(false),
        set_name: reported.map(str::to_string),
        primary: reply
            .get("primary")
            .and_then(Value::as_str)
            .map(str::to_string),
        hosts: reply
            .get("hosts")
            .and_then(Value::as_array)
            .map(|hosts| {
                hosts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

#[async_trait]
impl DatabaseClient for MongoShell {
    fn name(&self) -> &str {
        "shell"
    }

    async fn initiate_replica_set(&self, set: &ReplicaSetIdentity) -> HerdResult<()> {
        info!("initiating replica set {} with {:?}", set.name, set.member_hosts());
        self.eval(set.port(), &initiate_script(set)).await.map(|_| ())
    }

    async fn replica_update_members(&self, set: &ReplicaSetIdentity) -> HerdResult<()> {
        info!("updating replica set {} members to {:?}", set.name, set.member_hosts());
        self.eval(set.port(), &reconfig_script(set)).await.map(|_| ())
    }

    async fn add_shard(&self, shard: &ShardTopology) -> HerdResult<()> {
        info!("adding shard {}", shard.shard_host());
        // Shards are added through the local router.
        self.eval(ROUTER_PORT, &add_shard_script(shard))
            .await
            .map(|_| ())
    }

    async fn is_master(&self, is_config_set: bool, set_name: &str) -> HerdResult<MasterStatus> {
        let port = if is_config_set { CFG_PORT } else { SHARD_SRV_PORT };
        let reply = self.eval(port, IS_MASTER_SCRIPT).await?;
        parse_master(&reply, set_name)
    }

    async fn update_connection_string(&self, rs_name: Option<&str>) -> HerdResult<String> {
        Ok(build_connection_string(rs_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_initiate_script_for_config_set() {
        let set = ReplicaSetIdentity::config_set(members(&["10.0.0.1", "10.0.0.2"])).unwrap();
        let script = initiate_script(&set);
        assert!(script.contains(r#"var hosts = ["10.0.0.1:26050","10.0.0.2:26050"];"#));
        assert!(script.contains(r#"_id: "config0""#));
        assert!(script.contains("configsvr: true"));
        assert!(script.ends_with("print(JSON.stringify(rs.initiate(cfg)));"));
    }

    #[test]
    fn test_reconfig_script_bumps_version() {
        let set = ReplicaSetIdentity::new("rs1", members(&["10.0.0.1"]), false).unwrap();
        let script = reconfig_script(&set);
        assert!(script.contains(r#"["10.0.0.1:27000"]"#));
        assert!(script.contains("cfg.version += 1;"));
        assert!(script.contains("rs.reconfig(cfg)"));
    }

    #[test]
    fn test_scripts_escape_names() {
        let shard = ShardTopology {
            name: "a\"b".to_string(),
            seed: "10.0.0.1".to_string(),
            first_shard: false,
        };
        assert_eq!(
            add_shard_script(&shard),
            r#"print(JSON.stringify(sh.addShard("a\"b/10.0.0.1:27000")));"#
        );
    }

    #[test]
    fn test_parse_reply() {
        assert!(parse_reply("MongoDB shell version\n{\"ok\":1}\n").is_ok());
        assert_eq!(
            parse_reply("{\"ok\":0,\"errmsg\":\"already initialized\"}"),
            Err(HerdError::Database("already initialized".to_string()))
        );
        assert!(parse_reply("").is_err());
        assert!(parse_reply("Error: couldn't connect").is_err());
    }

    #[test]
    fn test_parse_master() {
        let reply: Value = serde_json::from_str(
            r#"{"ismaster":true,"setName":"rs1","primary":"10.0.0.1:27000",
                "hosts":["10.0.0.1:27000","10.0.0.2:27000"],"ok":1}"#,
        )
        .unwrap();
        let status = parse_master(&reply, "rs1").unwrap();
        assert!(status.is_master);
        assert_eq!(status.primary.as_deref(), Some("10.0.0.1:27000"));
        assert_eq!(status.hosts.len(), 2);

        assert!(parse_master(&reply, "rs2").is_err());
    }

    #[tokio::test]
    async fn test_missing_shell_binary() {
        let shell = MongoShell::new("/nonexistent/mongo");
        assert_eq!(shell.name(), "shell");
        assert!(matches!(
            shell.is_master(false, "rs1").await,
            Err(HerdError::Database(_))
        ));
    }
}
