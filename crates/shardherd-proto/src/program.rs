//! Supervised process definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::constants::{PROGRAM_DIRECTORY, PROGRAM_PRIORITY, PROGRAM_USER};
use crate::error::{HerdError, HerdResult};
use crate::role::ClusterNodeRole;

/// A process registered with the process supervisor.
///
/// `name` is the unique supervisor key; registering a definition under an
/// existing name replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDef {
    pub name: String,
    /// argv of the process, program first.
    pub command: Vec<String>,
    pub directory: PathBuf,
    pub user: String,
    pub autostart: bool,
    pub priority: u32,
}

impl ProgramDef {
    /// Build a definition, rejecting names and commands the supervisor
    /// could not register.
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        directory: impl Into<PathBuf>,
        user: impl Into<String>,
        autostart: bool,
        priority: u32,
    ) -> HerdResult<Self> {
        let name = name.into();
        let user = user.into();
        validate_name(&name)?;
        if command.is_empty() || command.iter().any(|a| a.is_empty()) {
            return Err(HerdError::InvalidArgument(format!(
                "program {} has an empty command or argument",
                name
            )));
        }
        if user.trim().is_empty() {
            return Err(HerdError::InvalidArgument(format!(
                "program {} has no run-as user",
                name
            )));
        }
        Ok(Self {
            name,
            command,
            directory: directory.into(),
            user,
            autostart,
            priority,
        })
    }

    /// A database process with the fixed directory, user and priority
    /// every role uses.
    pub fn database(name: impl Into<String>, command: Vec<String>) -> HerdResult<Self> {
        Self::new(
            name,
            command,
            PROGRAM_DIRECTORY,
            PROGRAM_USER,
            true,
            PROGRAM_PRIORITY,
        )
    }

    /// Command line as a single space-separated string.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Value following `flag` in the command, if present.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.command
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.command.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.command.iter().any(|a| a == flag)
    }

    /// Role of this program, derived from its name.
    pub fn role(&self) -> Option<ClusterNodeRole> {
        ClusterNodeRole::from_program_name(&self.name)
    }
}

impl fmt::Display for ProgramDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.command_line())
    }
}

fn validate_name(name: &str) -> HerdResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(HerdError::InvalidArgument(format!(
            "invalid program name '{}'",
            name
        )))
    }
}
