/// Shardherd error types.
///
/// A single enum covers every failure a node can report, so that an error
/// raised by a collaborator on one node can travel inside an RPC response
/// and be shown unchanged by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified error type for all shardherd operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum HerdError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("process supervisor error: {0}")]
    Supervisor(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("local config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operation timed out")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("operation not supported")]
    NoSupport,
}

impl HerdError {
    /// Whether the error was raised by argument validation rather than by
    /// a collaborator. Validation errors are never worth retrying.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result type alias for shardherd operations.
pub type HerdResult<T> = Result<T, HerdError>;

impl From<std::io::Error> for HerdError {
    fn from(e: std::io::Error) -> Self {
        HerdError::Io(e.to_string())
    }
}

/// A step of a role-transition pipeline.
///
/// Steps run strictly in declaration order; the first failing step ends the
/// transition and is reported in [`StepError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionStep {
    Validate,
    RemovePrevious,
    ProvisionDataDir,
    RegisterProgram,
    PersistIdentity,
    ApplyChanges,
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validate => "validate",
            Self::RemovePrevious => "remove-previous",
            Self::ProvisionDataDir => "provision-data-dir",
            Self::RegisterProgram => "register-program",
            Self::PersistIdentity => "persist-identity",
            Self::ApplyChanges => "apply-changes",
        };
        f.write_str(s)
    }
}

/// Failure of a role transition, tagged with the step that failed.
///
/// Steps before `step` have been applied and are not rolled back; re-running
/// the same promotion is the recovery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct StepError {
    pub step: TransitionStep,
    pub source: HerdError,
}

impl StepError {
    pub fn new(step: TransitionStep, source: HerdError) -> Self {
        Self { step, source }
    }
}

/// Helper for tagging a collaborator result with its pipeline step.
pub trait AtStep<T> {
    fn at(self, step: TransitionStep) -> Result<T, StepError>;
}

impl<T> AtStep<T> for HerdResult<T> {
    fn at(self, step: TransitionStep) -> Result<T, StepError> {
        self.map_err(|e| StepError::new(step, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display() {
        let err = StepError::new(
            TransitionStep::ProvisionDataDir,
            HerdError::Io("permission denied".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "provision-data-dir failed: I/O error: permission denied"
        );
    }

    #[test]
    fn test_at_step_tags_errors_only() {
        let ok: HerdResult<u32> = Ok(7);
        assert_eq!(ok.at(TransitionStep::ApplyChanges).unwrap(), 7);

        let err: HerdResult<u32> = Err(HerdError::Timeout);
        let tagged = err.at(TransitionStep::ApplyChanges).unwrap_err();
        assert_eq!(tagged.step, TransitionStep::ApplyChanges);
        assert_eq!(tagged.source, HerdError::Timeout);
    }

    #[test]
    fn test_io_error_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such dir");
        assert_eq!(HerdError::from(io), HerdError::Io("no such dir".to_string()));
    }
}
