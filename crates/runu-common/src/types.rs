//! Domain primitive types used across the runu workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunuError};

/// Longest identifier accepted, in bytes.
const MAX_ID_LEN: usize = 1024;

/// Unique identifier for an instance.
///
/// IDs double as state directory names, so they are restricted to ASCII
/// alphanumerics and `_ + - .` and may not start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an instance ID, validating it as a directory name.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::InvalidId`] if the value is empty, too long,
    /// starts with a dot, or contains a disallowed character. Dot-prefixed
    /// names in the root directory belong to the runtime (see
    /// `StateStore::delete`), which also rules out `.` and `..`.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.len() > MAX_ID_LEN {
            Some("longer than 1024 bytes")
        } else if id.starts_with('.') {
            Some("must not start with '.'")
        } else if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.'))
        {
            Some("only ASCII alphanumerics and _ + - . are allowed")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(RunuError::InvalidId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstanceId {
    type Error = RunuError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<InstanceId> for String {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Kernel start-time token of a process.
///
/// Paired with a PID it identifies one process across PID reuse: a recycled
/// PID belongs to a process with a different start time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartTime(u64);

impl StartTime {
    /// Wraps a raw start-time value (clock ticks since boot on Linux).
    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase last recorded by a mutating operation.
///
/// The phase states intent. The status actually reported is derived from
/// the phase and live process facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// The instance is being set up.
    Creating,
    /// Set up, init process not started yet.
    Created,
    /// Init process started.
    Running,
    /// Init process frozen.
    Paused,
    /// Init process gone. Terminal.
    Stopped,
}

impl Phase {
    /// Returns the lowercase name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// Whether a record in this phase may carry a live init process.
    #[must_use]
    pub const fn has_process(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Resolved, externally reported lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The instance is being set up.
    Creating,
    /// Set up, init process not started yet.
    Created,
    /// Init process alive.
    Running,
    /// Init process alive and frozen.
    Paused,
    /// Init process gone.
    Stopped,
}

impl Status {
    /// Returns the external schema string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

impl From<Phase> for Status {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Creating => Self::Creating,
            Phase::Created => Self::Created,
            Phase::Running => Self::Running,
            Phase::Paused => Self::Paused,
            Phase::Stopped => Self::Stopped,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_accepts_typical_names() {
        for id in ["my-unikernel", "web-1", "a.b_c+d", "x"] {
            assert!(InstanceId::new(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn instance_id_rejects_path_like_values() {
        for id in ["", ".", "..", ".hidden", ".deleted-a-1", "a/b", "../etc", "with space"] {
            assert!(
                matches!(InstanceId::new(id), Err(RunuError::InvalidId { .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn instance_id_deserialization_validates() {
        let parsed: std::result::Result<InstanceId, _> = serde_json::from_str("\"a/b\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn phase_serializes_lowercase() {
        let json = serde_json::to_string(&Phase::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }

    #[test]
    fn status_mirrors_phase_names() {
        for phase in [
            Phase::Creating,
            Phase::Created,
            Phase::Running,
            Phase::Paused,
            Phase::Stopped,
        ] {
            assert_eq!(Status::from(phase).as_str(), phase.as_str());
        }
    }

    #[test]
    fn only_running_and_paused_carry_processes() {
        assert!(Phase::Running.has_process());
        assert!(Phase::Paused.has_process());
        assert!(!Phase::Created.has_process());
        assert!(!Phase::Stopped.has_process());
    }
}
