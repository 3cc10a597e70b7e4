//! Status resolution from the recorded phase and live process facts.
//!
//! The recorded phase says what the last writer intended. Whether the init
//! process still exists is only known by asking the probe, and a process
//! that died without anyone recording it leaves a stale record behind.
//! [`resolve_and_repair`] detects that case and writes the correction back
//! through the same exclusive-access path as any other writer.

use runu_common::constants::MAX_REPAIR_ATTEMPTS;
use runu_common::error::{Result, RunuError};
use runu_common::types::{InstanceId, Phase, StartTime, Status};

use crate::probe::{Liveness, ProcessProbe};
use crate::record::InstanceRecord;
use crate::state::StateStore;

/// Outcome of resolving a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Status to report.
    pub status: Status,
    /// The record claims a process that no longer exists and should be
    /// marked stopped.
    pub stale: bool,
}

impl Resolution {
    const fn current(status: Status) -> Self {
        Self {
            status,
            stale: false,
        }
    }

    const fn stale() -> Self {
        Self {
            status: Status::Stopped,
            stale: true,
        }
    }
}

/// Resolves the status of `record` without touching persisted state.
///
/// A recorded process counts as alive only if its PID is live *and* its
/// start time matches the recorded token.
///
/// # Errors
///
/// Returns [`RunuError::ProbeFailure`], naming the instance and its phase,
/// if the probe cannot answer. No status is guessed in that case.
pub fn resolve(record: &InstanceRecord, probe: &dyn ProcessProbe) -> Result<Resolution> {
    let phase = record.phase();
    match (phase, record.pid()) {
        (Phase::Stopped, _) => Ok(Resolution::current(Status::Stopped)),
        (Phase::Creating | Phase::Created, 0) => Ok(Resolution::current(phase.into())),
        (Phase::Running | Phase::Paused, 0) => Ok(Resolution::stale()),
        (_, pid) => match probe
            .liveness(pid, record.start_time())
            .map_err(|e| e.for_instance(record.id(), phase))?
        {
            Liveness::Alive => Ok(Resolution::current(phase.into())),
            Liveness::Exited => {
                tracing::debug!(id = %record.id(), pid, "init process exited");
                Ok(Resolution::stale())
            }
            Liveness::Recycled { current } => {
                tracing::debug!(
                    id = %record.id(),
                    pid,
                    recorded = %record.start_time(),
                    %current,
                    "init pid reused by another process"
                );
                Ok(Resolution::stale())
            }
        },
    }
}

/// Process identity a repair decision was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observed {
    phase: Phase,
    pid: u32,
    start_time: StartTime,
}

impl Observed {
    const fn of(record: &InstanceRecord) -> Self {
        Self {
            phase: record.phase(),
            pid: record.pid(),
            start_time: record.start_time(),
        }
    }
}

/// Loads `id`, resolves its status, and persists a stale record as stopped.
///
/// The probe runs outside the lock. Under the lock the correction is only
/// applied if the record still describes the process that was probed;
/// otherwise another writer got there first and the fresh record is
/// resolved again.
///
/// Returns the record as it stands after any repair, with its status.
///
/// # Errors
///
/// Returns the errors of [`StateStore::load`], [`resolve`], and
/// [`StateStore::with_exclusive_access`], or
/// [`RunuError::LockContention`] if the record keeps changing under the
/// repair.
pub fn resolve_and_repair(
    store: &StateStore,
    id: &InstanceId,
    probe: &dyn ProcessProbe,
) -> Result<(InstanceRecord, Status)> {
    let started = std::time::Instant::now();
    let mut record = store.load(id)?;

    for _ in 0..MAX_REPAIR_ATTEMPTS {
        let resolution = resolve(&record, probe)?;
        if !resolution.stale {
            return Ok((record, resolution.status));
        }

        let observed = Observed::of(&record);
        let (fresh, repaired) = store.with_exclusive_access(id, |fresh| {
            let repaired = Observed::of(fresh) == observed;
            if repaired {
                fresh.mark_stopped();
            }
            Ok((fresh.clone(), repaired))
        })?;

        if repaired {
            tracing::info!(
                parent: store.span(),
                id = %id,
                pid = observed.pid,
                phase = %observed.phase,
                "init process gone, instance marked stopped"
            );
            return Ok((fresh, Status::Stopped));
        }
        tracing::debug!(
            parent: store.span(),
            id = %id,
            "record changed during repair, re-resolving"
        );
        record = fresh;
    }

    Err(RunuError::LockContention {
        id: id.to_string(),
        root: store.root().to_path_buf(),
        waited: started.elapsed(),
    })
}
