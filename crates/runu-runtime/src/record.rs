//! Persisted instance record and its lifecycle transitions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use runu_common::constants::SUPPORTED_SPEC_MAJOR;
use runu_common::error::{Result, RunuError};
use runu_common::types::{InstanceId, Phase, StartTime};
use serde::{Deserialize, Serialize};

/// Persistent record of one instance.
///
/// Identity fields are fixed at construction. The process fields and the
/// phase only change through the `mark_*` transitions, which keep the
/// record's invariants intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceRecord {
    id: InstanceId,
    bundle_path: PathBuf,
    rootfs_path: PathBuf,
    spec_version: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    init_process_pid: u32,
    init_process_start_time: StartTime,
    last_known_phase: Phase,
}

impl InstanceRecord {
    /// Creates a record in the `Creating` phase, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::Config`] if the bundle or rootfs path is relative.
    pub fn new(
        id: InstanceId,
        bundle_path: impl Into<PathBuf>,
        rootfs_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let bundle_path = bundle_path.into();
        let rootfs_path = rootfs_path.into();
        for path in [&bundle_path, &rootfs_path] {
            if !path.is_absolute() {
                return Err(RunuError::Config {
                    message: format!("path {} for instance {id} is not absolute", path.display()),
                });
            }
        }
        Ok(Self {
            id,
            bundle_path,
            rootfs_path,
            spec_version: runu_common::constants::DEFAULT_SPEC_VERSION.to_owned(),
            created_at: Utc::now(),
            labels: BTreeMap::new(),
            init_process_pid: 0,
            init_process_start_time: StartTime::default(),
            last_known_phase: Phase::Creating,
        })
    }

    /// Sets the runtime-spec version the record complies with.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::Config`] if the version is not a supported
    /// `MAJOR.MINOR.PATCH[-pre]` version.
    pub fn with_spec_version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        if !is_supported_spec_version(&version) {
            return Err(RunuError::Config {
                message: format!("unsupported spec version {version:?} for instance {}", self.id),
            });
        }
        self.spec_version = version;
        Ok(self)
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sets the labels supplied at creation.
    #[must_use]
    pub fn with_labels<K, V>(mut self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Instance identifier.
    #[must_use]
    pub const fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Absolute path of the instance bundle.
    #[must_use]
    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// Absolute path of the instance root filesystem.
    #[must_use]
    pub fn rootfs_path(&self) -> &Path {
        &self.rootfs_path
    }

    /// Runtime-spec version the record complies with.
    #[must_use]
    pub fn spec_version(&self) -> &str {
        &self.spec_version
    }

    /// UTC creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Labels supplied at creation.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// PID of the init process, 0 when there is none.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.init_process_pid
    }

    /// Start-time token recorded alongside the PID.
    #[must_use]
    pub const fn start_time(&self) -> StartTime {
        self.init_process_start_time
    }

    /// Phase last recorded by a mutating operation.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.last_known_phase
    }

    /// `Creating` → `Created`.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::InvalidState`] from any other phase.
    pub fn mark_created(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::Creating], "finish creating")?;
        self.last_known_phase = Phase::Created;
        Ok(())
    }

    /// `Created` → `Running`, recording the init process identity.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::InvalidState`] unless the instance is `Created`,
    /// or [`RunuError::Config`] if `pid` is 0.
    pub fn mark_running(&mut self, pid: u32, start_time: StartTime) -> Result<()> {
        self.expect_phase(&[Phase::Created], "start")?;
        if pid == 0 {
            return Err(RunuError::Config {
                message: format!("instance {} cannot run with pid 0", self.id),
            });
        }
        self.init_process_pid = pid;
        self.init_process_start_time = start_time;
        self.last_known_phase = Phase::Running;
        Ok(())
    }

    /// `Running` → `Paused`.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::InvalidState`] unless the instance is `Running`.
    pub fn mark_paused(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::Running], "pause")?;
        self.last_known_phase = Phase::Paused;
        Ok(())
    }

    /// `Paused` → `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::InvalidState`] unless the instance is `Paused`.
    pub fn mark_resumed(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::Paused], "resume")?;
        self.last_known_phase = Phase::Running;
        Ok(())
    }

    /// Moves to the terminal `Stopped` phase and forgets the init process.
    ///
    /// Stopping an already stopped record is a no-op.
    pub fn mark_stopped(&mut self) {
        self.init_process_pid = 0;
        self.init_process_start_time = StartTime::default();
        self.last_known_phase = Phase::Stopped;
    }

    /// Whether the record may be deleted: `Created` or `Stopped`, no process.
    #[must_use]
    pub const fn is_deletable(&self) -> bool {
        matches!(self.last_known_phase, Phase::Created | Phase::Stopped)
            && self.init_process_pid == 0
    }

    /// Checks the cross-field invariants, returning the first violation.
    pub(crate) fn invariant_violation(&self) -> Option<&'static str> {
        if self.last_known_phase == Phase::Stopped && self.init_process_pid != 0 {
            return Some("stopped record carries a pid");
        }
        if self.init_process_pid != 0 && !self.last_known_phase.has_process() {
            return Some("pid recorded outside running or paused phase");
        }
        if !self.bundle_path.is_absolute() || !self.rootfs_path.is_absolute() {
            return Some("bundle and rootfs paths must be absolute");
        }
        None
    }

    pub(crate) fn has_supported_spec_version(&self) -> bool {
        is_supported_spec_version(&self.spec_version)
    }

    fn expect_phase(&self, allowed: &[Phase], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.last_known_phase) {
            Ok(())
        } else {
            Err(RunuError::InvalidState {
                id: self.id.to_string(),
                phase: self.last_known_phase,
                operation,
            })
        }
    }
}

/// Accepts `MAJOR.MINOR.PATCH` with an optional `-pre` suffix and the
/// supported major version.
fn is_supported_spec_version(version: &str) -> bool {
    let core = version.split_once('-').map_or(version, |(core, _)| core);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    let Ok(numbers) = parts
        .iter()
        .map(|p| p.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
    else {
        return false;
    };
    numbers[0] == SUPPORTED_SPEC_MAJOR
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> InstanceRecord {
        InstanceRecord::new(
            InstanceId::new(id).unwrap(),
            "/var/lib/bundles/app",
            "/var/lib/bundles/app/rootfs",
        )
        .unwrap()
    }

    #[test]
    fn new_record_is_creating_without_process() {
        let r = record("test-1");
        assert_eq!(r.phase(), Phase::Creating);
        assert_eq!(r.pid(), 0);
        assert!(r.labels().is_empty());
        assert!(r.invariant_violation().is_none());
    }

    #[test]
    fn spec_version_must_be_supported() {
        assert_eq!(
            record("v").with_spec_version("1.0.2-dev").unwrap().spec_version(),
            "1.0.2-dev"
        );
        for bad in ["2.0.0", "1.1", "one.two.three"] {
            assert!(matches!(
                record("v").with_spec_version(bad),
                Err(RunuError::Config { .. })
            ));
        }
    }

    #[test]
    fn relative_paths_are_rejected() {
        let err = InstanceRecord::new(InstanceId::new("rel").unwrap(), "bundle", "/rootfs");
        assert!(matches!(err, Err(RunuError::Config { .. })));
    }

    #[test]
    fn full_lifecycle_keeps_invariants() {
        let mut r = record("test-2");
        r.mark_created().unwrap();
        r.mark_running(4821, StartTime::new(77)).unwrap();
        assert_eq!(r.pid(), 4821);
        r.mark_paused().unwrap();
        r.mark_resumed().unwrap();
        assert_eq!(r.phase(), Phase::Running);
        r.mark_stopped();
        assert_eq!(r.phase(), Phase::Stopped);
        assert_eq!(r.pid(), 0);
        assert_eq!(r.start_time(), StartTime::default());
        assert!(r.invariant_violation().is_none());
    }

    #[test]
    fn starting_twice_is_refused() {
        let mut r = record("test-3");
        r.mark_created().unwrap();
        r.mark_running(10, StartTime::new(1)).unwrap();
        let err = r.mark_running(11, StartTime::new(2)).unwrap_err();
        assert!(matches!(
            err,
            RunuError::InvalidState {
                phase: Phase::Running,
                operation: "start",
                ..
            }
        ));
        assert_eq!(r.pid(), 10);
    }

    #[test]
    fn running_requires_a_pid() {
        let mut r = record("test-4");
        r.mark_created().unwrap();
        assert!(r.mark_running(0, StartTime::new(1)).is_err());
        assert_eq!(r.phase(), Phase::Created);
    }

    #[test]
    fn pausing_a_created_instance_is_refused() {
        let mut r = record("test-5");
        r.mark_created().unwrap();
        assert!(r.mark_paused().is_err());
    }

    #[test]
    fn deletable_only_without_process() {
        let mut r = record("test-6");
        assert!(!r.is_deletable());
        r.mark_created().unwrap();
        assert!(r.is_deletable());
        r.mark_running(5, StartTime::new(5)).unwrap();
        assert!(!r.is_deletable());
        r.mark_stopped();
        assert!(r.is_deletable());
    }
}
