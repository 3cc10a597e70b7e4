//! Unified error types for the runu workspace.
//!
//! Every variant carries the instance ID and, where it applies, the root
//! directory or lifecycle phase involved, so a failure can be diagnosed
//! from the message alone without retrying the operation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Phase;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RunuError {
    /// No record exists for the instance under the root directory.
    #[error("instance {id} not found under {root}")]
    NotFound {
        /// Identifier that was looked up.
        id: String,
        /// Root directory that was searched.
        root: PathBuf,
    },

    /// An instance with this ID already exists under the root directory.
    #[error("instance {id} already exists under {root}")]
    AlreadyExists {
        /// Conflicting identifier.
        id: String,
        /// Root directory holding the existing instance.
        root: PathBuf,
    },

    /// The persisted record could not be decoded.
    #[error("corrupt state record for instance {id} at {path}: {reason}")]
    CorruptRecord {
        /// Identifier of the instance whose record is unreadable.
        id: String,
        /// Path of the offending record file.
        path: PathBuf,
        /// What was wrong with the bytes.
        reason: String,
    },

    /// A record was about to be persisted in a form that could not be read
    /// back.
    #[error("refusing to persist invalid record for instance {id}: {reason}")]
    InvalidRecord {
        /// Identifier of the instance.
        id: String,
        /// Which check the record failed.
        reason: String,
    },

    /// The per-instance lock could not be acquired within the bounded wait.
    #[error("instance {id} under {root} is locked by another operation (waited {waited:?})")]
    LockContention {
        /// Identifier of the contended instance.
        id: String,
        /// Root directory of the contended instance.
        root: PathBuf,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The operation is not legal for the instance's current phase.
    #[error("cannot {operation} instance {id} in phase {phase}")]
    InvalidState {
        /// Identifier of the instance.
        id: String,
        /// Phase the instance was found in.
        phase: Phase,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// The liveness check for an instance's init process could not be
    /// performed.
    #[error("probing process {pid} of instance {id} in phase {phase} failed: {message}")]
    ProbeFailure {
        /// Identifier of the instance.
        id: String,
        /// Phase recorded for the instance.
        phase: Phase,
        /// Process that was probed.
        pid: u32,
        /// Description of the failure.
        message: String,
    },

    /// The operation was cancelled while waiting for the instance lock.
    #[error("operation on instance {id} under {root} cancelled while waiting for its lock")]
    Cancelled {
        /// Identifier of the instance.
        id: String,
        /// Root directory of the instance.
        root: PathBuf,
    },

    /// The instance identifier is not usable as a state directory name.
    #[error("invalid instance id {id:?}: {reason}")]
    InvalidId {
        /// Rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization of an outbound document failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl RunuError {
    /// Builds an [`RunuError::Io`] from a path and the error it produced.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RunuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_id_and_root() {
        let err = RunuError::NotFound {
            id: "web-1".into(),
            root: PathBuf::from("/run/runu"),
        };
        assert_eq!(err.to_string(), "instance web-1 not found under /run/runu");
    }

    #[test]
    fn invalid_state_names_phase() {
        let err = RunuError::InvalidState {
            id: "web-1".into(),
            phase: Phase::Running,
            operation: "delete",
        };
        assert_eq!(err.to_string(), "cannot delete instance web-1 in phase running");
    }

    #[test]
    fn probe_failure_names_instance_and_phase() {
        let err = RunuError::ProbeFailure {
            id: "web-1".into(),
            phase: Phase::Paused,
            pid: 4821,
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "probing process 4821 of instance web-1 in phase paused failed: permission denied"
        );
    }
}
