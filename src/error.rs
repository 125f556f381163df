//! Error taxonomy for workflow operations.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    /// External executable exited with a nonzero status.
    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Executable reported success but the asserted output is absent.
    #[error("completed but no output produced: {}", path.display())]
    OutputMissing { path: PathBuf },

    /// Executable could not be started at all (missing binary, permissions).
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither metadata backend produced a usable field.
    #[error("metadata unavailable for {}", path.display())]
    MetadataUnavailable { path: PathBuf },

    #[error("failed to write divider config {}: {source}", path.display())]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Request rejected before any worker started.
    #[error("invalid request: {0}")]
    ValidationFailed(String),

    /// Another operation is still running on this manager.
    #[error("another operation is already running")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::ValidationFailed(msg.into())
    }

    /// Errors raised by an external tool run, as opposed to local setup problems.
    pub fn is_process_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::ProcessFailed { .. }
                | WorkflowError::OutputMissing { .. }
                | WorkflowError::Spawn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_missing_message_names_path() {
        let err = WorkflowError::OutputMissing {
            path: PathBuf::from("/tmp/out.pcd"),
        };
        assert_eq!(
            err.to_string(),
            "completed but no output produced: /tmp/out.pcd"
        );
        assert!(err.is_process_error());
    }

    #[test]
    fn validation_is_not_a_process_error() {
        let err = WorkflowError::validation("task list is empty");
        assert_eq!(err.to_string(), "invalid request: task list is empty");
        assert!(!err.is_process_error());
    }
}
