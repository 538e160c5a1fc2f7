//! supervisord backend.
//!
//! Programs are `[program:<name>]` sections of a dedicated conf file that
//! the main supervisord configuration includes. Staging a change edits the
//! file; `apply_changes` runs `supervisorctl update`, which starts added
//! programs, stops removed ones and restarts only those whose section
//! changed.
//!
//! Sections that are not `[program:*]`, and comment lines before the first
//! section, are preserved untouched.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use shardherd_proto::defaults::DEFAULT_SHELL_TIMEOUT_SECS;
use shardherd_proto::{HerdError, HerdResult, ProgramDef};

use super::{is_mongo_program, ProcessSupervisor, ReconcileReport};
use crate::fsutil;

const PROGRAM_HEADER_PREFIX: &str = "[program:";

/// One `[...]` section of the conf file, or the preamble before the first.
#[derive(Debug, Clone, PartialEq)]
struct Section {
    /// Header line, `None` for the preamble.
    header: Option<String>,
    lines: Vec<String>,
}

impl Section {
    fn program_name(&self) -> Option<&str> {
        self.header
            .as_deref()?
            .strip_prefix(PROGRAM_HEADER_PREFIX)?
            .strip_suffix(']')
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| {
            let (k, v) = l.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    fn from_program(def: &ProgramDef) -> Self {
        Self {
            header: Some(format!("{}{}]", PROGRAM_HEADER_PREFIX, def.name)),
            lines: vec![
                format!("command={}", def.command_line()),
                format!("directory={}", def.directory.display()),
                format!("user={}", def.user),
                format!("autostart={}", def.autostart),
                format!("priority={}", def.priority),
            ],
        }
    }

    fn to_program(&self) -> Option<ProgramDef> {
        let name = self.program_name()?;
        let command = self
            .value("command")?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        ProgramDef::new(
            name,
            command,
            self.value("directory").unwrap_or("/"),
            self.value("user").unwrap_or("root"),
            self.value("autostart").map(|v| v == "true").unwrap_or(true),
            self.value("priority")
                .and_then(|v| v.parse().ok())
                .unwrap_or(999),
        )
        .ok()
    }
}

fn parse_conf(text: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        header: None,
        lines: Vec::new(),
    }];
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            sections.push(Section {
                header: Some(trimmed.to_string()),
                lines: Vec::new(),
            });
        } else if !trimmed.is_empty() {
            if let Some(current) = sections.last_mut() {
                current.lines.push(line.to_string());
            }
        }
    }
    sections
}

fn render_conf(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        if section.header.is_none() && section.lines.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        if let Some(header) = &section.header {
            out.push_str(header);
            out.push('\n');
        }
        for line in &section.lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Parse `supervisorctl update` output.
///
/// supervisorctl prints one `<name>: <action> process group` line per
/// affected group, preceded by `<name>: stopped` for removed or changed
/// ones.
fn parse_update_output(output: &str) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for line in output.lines() {
        let Some((name, action)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_string();
        match action.trim() {
            "added process group" => report.added.push(name),
            "removed process group" => report.removed.push(name),
            "updated process group" => report.changed.push(name),
            _ => {}
        }
    }
    report
}

/// Process supervisor backed by supervisord.
pub struct Supervisord {
    conf_path: PathBuf,
    ctl_bin: String,
    timeout: Duration,
    /// Serializes read-modify-write cycles on the conf file.
    lock: Mutex<()>,
}

impl Supervisord {
    pub fn new(conf_path: impl Into<PathBuf>, ctl_bin: impl Into<String>) -> Self {
        Self {
            conf_path: conf_path.into(),
            ctl_bin: ctl_bin.into(),
            timeout: Duration::from_secs(DEFAULT_SHELL_TIMEOUT_SECS),
            lock: Mutex::new(()),
        }
    }

    async fn read_sections(&self) -> HerdResult<Vec<Section>> {
        match tokio::fs::read_to_string(&self.conf_path).await {
            Ok(text) => Ok(parse_conf(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(parse_conf("")),
            Err(e) => Err(HerdError::Supervisor(format!(
                "read {}: {}",
                self.conf_path.display(),
                e
            ))),
        }
    }

    async fn write_sections(&self, sections: &[Section]) -> HerdResult<()> {
        fsutil::atomic_write(&self.conf_path, render_conf(sections).into_bytes())
            .await
            .map_err(|e| HerdError::Supervisor(e.to_string()))
    }
}

#[async_trait]
impl ProcessSupervisor for Supervisord {
    fn name(&self) -> &str {
        "supervisord"
    }

    async fn add_program(&self, def: &ProgramDef) -> HerdResult<()> {
        let _guard = self.lock.lock().await;
        let mut sections = self.read_sections().await?;
        let new_section = Section::from_program(def);
        match sections
            .iter_mut()
            .find(|s| s.program_name() == Some(def.name.as_str()))
        {
            Some(existing) => *existing = new_section,
            None => sections.push(new_section),
        }
        self.write_sections(&sections).await?;
        debug!("supervisord: staged program {}", def);
        Ok(())
    }

    async fn remove_program(&self, name: &str) -> HerdResult<bool> {
        let _guard = self.lock.lock().await;
        let mut sections = self.read_sections().await?;
        let before = sections.len();
        sections.retain(|s| s.program_name() != Some(name));
        if sections.len() == before {
            return Ok(false);
        }
        self.write_sections(&sections).await?;
        debug!("supervisord: staged removal of {}", name);
        Ok(true)
    }

    async fn apply_changes(&self) -> HerdResult<ReconcileReport> {
        let _guard = self.lock.lock().await;
        let mut cmd = Command::new(&self.ctl_bin);
        cmd.arg("update").kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| HerdError::Timeout)?
            .map_err(|e| HerdError::Supervisor(format!("spawn {}: {}", self.ctl_bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} update failed: {}", self.ctl_bin, stderr.trim());
            return Err(HerdError::Supervisor(format!(
                "{} update exited with {}: {}",
                self.ctl_bin,
                output.status,
                stderr.trim()
            )));
        }

        let report = parse_update_output(&String::from_utf8_lossy(&output.stdout));
        info!(
            "supervisord: applied (added={:?}, removed={:?}, changed={:?})",
            report.added, report.removed, report.changed
        );
        Ok(report)
    }

    async fn list_mongo_programs(&self) -> HerdResult<Vec<ProgramDef>> {
        let sections = self.read_sections().await?;
        Ok(sections
            .iter()
            .filter_map(Section::to_program)
            .filter(|p| is_mongo_program(&p.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shardherd_supervisord_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn program(name: &str, cmd: &str) -> ProgramDef {
        ProgramDef::database(name, cmd.split_whitespace().map(str::to_string).collect()).unwrap()
    }

    #[test]
    fn test_parse_update_output() {
        let out = "mongodb: stopped\nmongodb: removed process group\n\
                   mongors-rs1: added process group\nmongos: stopped\n\
                   mongos: updated process group\n";
        let report = parse_update_output(out);
        assert_eq!(report.added, vec!["mongors-rs1"]);
        assert_eq!(report.removed, vec!["mongodb"]);
        assert_eq!(report.changed, vec!["mongos"]);
    }

    #[test]
    fn test_conf_round_trip_preserves_foreign_sections() {
        let text = "; managed file\n[program:webserver]\ncommand=node server.js\n\n\
                    [group:web]\nprograms=webserver\n";
        let sections = parse_conf(text);
        let rendered = render_conf(&sections);
        assert_eq!(parse_conf(&rendered), sections);
        assert!(rendered.starts_with("; managed file\n"));
        assert!(rendered.contains("[group:web]\nprograms=webserver\n"));
    }

    #[tokio::test]
    async fn test_add_replace_remove_program() {
        let tmp = scratch("edit");
        let sup = Supervisord::new(tmp.join("supervisor.conf"), "true");
        assert_eq!(sup.name(), "supervisord");

        sup.add_program(&program("mongos", "mongos --configdb a:26050"))
            .await
            .unwrap();
        sup.add_program(&program("mongos", "mongos --configdb b:26050"))
            .await
            .unwrap();

        let programs = sup.list_mongo_programs().await.unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].arg_value("--configdb"), Some("b:26050"));
        assert_eq!(programs[0].user, "root");
        assert!(programs[0].autostart);

        assert!(sup.remove_program("mongos").await.unwrap());
        assert!(!sup.remove_program("mongos").await.unwrap());
        assert!(sup.list_mongo_programs().await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn test_list_ignores_non_mongo_programs() {
        let tmp = scratch("list");
        std::fs::create_dir_all(&tmp).unwrap();
        let conf = tmp.join("supervisor.conf");
        std::fs::write(
            &conf,
            "[program:webserver]\ncommand=node server.js\n\n\
             [program:mongodb]\ncommand=mongod --port 27017\ndirectory=/usr/bin\n",
        )
        .unwrap();

        let sup = Supervisord::new(&conf, "true");
        let programs = sup.list_mongo_programs().await.unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].name, "mongodb");

        assert!(sup.remove_program("mongodb").await.unwrap());
        let text = std::fs::read_to_string(&conf).unwrap();
        assert!(text.contains("[program:webserver]"));
        assert!(!text.contains("mongodb"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn test_apply_changes_runs_ctl() {
        let tmp = scratch("apply");
        let ok = Supervisord::new(tmp.join("supervisor.conf"), "true");
        assert!(ok.apply_changes().await.unwrap().is_noop());

        let failing = Supervisord::new(tmp.join("supervisor.conf"), "false");
        assert!(matches!(
            failing.apply_changes().await,
            Err(HerdError::Supervisor(_))
        ));

        let missing = Supervisord::new(tmp.join("supervisor.conf"), "/nonexistent/supervisorctl");
        assert!(matches!(
            missing.apply_changes().await,
            Err(HerdError::Supervisor(_))
        ));
    }
}
