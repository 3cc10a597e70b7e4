//! Control operations built on the state store and the probe.

use std::time::Instant;

use nix::sys::signal::Signal;
use runu_common::error::{Result, RunuError};
use runu_common::types::{InstanceId, Status};

use crate::probe::{ProbeError, ProcessProbe};
use crate::state::StateStore;
use crate::status;

/// Sends `signal` to the init process of a running or paused instance.
///
/// # Errors
///
/// Returns [`RunuError::InvalidState`] if the instance has no live init
/// process, or the errors of status resolution and of the probe.
pub fn kill(
    store: &StateStore,
    probe: &dyn ProcessProbe,
    id: &InstanceId,
    signal: Signal,
) -> Result<()> {
    let (record, status) = status::resolve_and_repair(store, id, probe)?;
    if !matches!(status, Status::Running | Status::Paused) {
        return Err(RunuError::InvalidState {
            id: id.to_string(),
            phase: record.phase(),
            operation: "kill",
        });
    }
    tracing::info!(
        parent: store.span(),
        id = %id,
        pid = record.pid(),
        signal = signal.as_str(),
        "signalling init process"
    );
    probe
        .signal(record.pid(), signal)
        .map_err(|e| e.for_instance(id, record.phase()))
}

/// Deletes instance `id`.
///
/// Stale records are repaired first, so an instance whose process died
/// unnoticed can be deleted. With `force`, a live init process is killed
/// and awaited (bounded by the lock timeout) before the record is removed.
///
/// # Errors
///
/// Returns [`RunuError::InvalidState`] if the instance is still live and
/// `force` is not set, or if a forced kill does not take effect in time.
pub fn delete(
    store: &StateStore,
    probe: &dyn ProcessProbe,
    id: &InstanceId,
    force: bool,
) -> Result<()> {
    let (record, status) = status::resolve_and_repair(store, id, probe)?;
    if force && matches!(status, Status::Running | Status::Paused) {
        let (pid, start_time) = (record.pid(), record.start_time());
        tracing::info!(parent: store.span(), id = %id, pid, "force-killing init process");
        let probe_failed = |e: ProbeError| e.for_instance(id, record.phase());
        probe.signal(pid, Signal::SIGKILL).map_err(probe_failed)?;

        let deadline = Instant::now() + store.config().lock_timeout;
        while probe.is_alive(pid, start_time).map_err(probe_failed)? {
            if Instant::now() >= deadline {
                return Err(RunuError::InvalidState {
                    id: id.to_string(),
                    phase: record.phase(),
                    operation: "force-delete",
                });
            }
            std::thread::sleep(store.config().lock_poll_interval);
        }
        let _ = status::resolve_and_repair(store, id, probe)?;
    }
    store.delete(id)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use runu_common::config::RuntimeConfig;
    use runu_common::types::{Phase, StartTime};

    use super::*;
    use crate::probe::ProbeResult;
    use crate::record::InstanceRecord;

    /// Probe whose processes die on SIGKILL and record every signal.
    #[derive(Default)]
    struct FakeEngine {
        live: Mutex<HashMap<u32, StartTime>>,
        signals: Mutex<Vec<(u32, Signal)>>,
    }

    impl ProcessProbe for FakeEngine {
        fn start_time(&self, pid: u32) -> ProbeResult<Option<StartTime>> {
            Ok(self.live.lock().unwrap().get(&pid).copied())
        }

        fn signal(&self, pid: u32, signal: Signal) -> ProbeResult<()> {
            self.signals.lock().unwrap().push((pid, signal));
            if signal == Signal::SIGKILL {
                let _ = self.live.lock().unwrap().remove(&pid);
            }
            Ok(())
        }
    }

    fn running(store: &StateStore, engine: &FakeEngine, id: &str, pid: u32) -> InstanceId {
        let id = InstanceId::new(id).unwrap();
        let mut r = InstanceRecord::new(id.clone(), "/b", "/b/rootfs").unwrap();
        r.mark_created().unwrap();
        r.mark_running(pid, StartTime::new(u64::from(pid))).unwrap();
        store.create(&r).unwrap();
        let _ = engine
            .live
            .lock()
            .unwrap()
            .insert(pid, StartTime::new(u64::from(pid)));
        id
    }

    #[test]
    fn kill_signals_live_init_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(RuntimeConfig::new(dir.path())).unwrap();
        let engine = FakeEngine::default();
        let id = running(&store, &engine, "svc", 300);

        kill(&store, &engine, &id, Signal::SIGTERM).unwrap();
        assert_eq!(*engine.signals.lock().unwrap(), [(300, Signal::SIGTERM)]);
    }

    #[test]
    fn kill_refuses_dead_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(RuntimeConfig::new(dir.path())).unwrap();
        let engine = FakeEngine::default();
        let id = running(&store, &engine, "svc", 300);
        engine.live.lock().unwrap().clear();

        let err = kill(&store, &engine, &id, Signal::SIGTERM).unwrap_err();
        assert!(matches!(err, RunuError::InvalidState { phase: Phase::Stopped, .. }));
        assert!(engine.signals.lock().unwrap().is_empty());
    }

    #[test]
    fn delete_without_force_refuses_live_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(RuntimeConfig::new(dir.path())).unwrap();
        let engine = FakeEngine::default();
        let id = running(&store, &engine, "svc", 300);

        assert!(matches!(
            delete(&store, &engine, &id, false),
            Err(RunuError::InvalidState { .. })
        ));
        assert!(store.load(&id).is_ok());
    }

    #[test]
    fn forced_delete_kills_then_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(RuntimeConfig::new(dir.path())).unwrap();
        let engine = FakeEngine::default();
        let id = running(&store, &engine, "svc", 300);

        delete(&store, &engine, &id, true).unwrap();
        assert_eq!(*engine.signals.lock().unwrap(), [(300, Signal::SIGKILL)]);
        assert!(matches!(store.load(&id), Err(RunuError::NotFound { .. })));
    }

    #[test]
    fn delete_of_dead_instance_repairs_then_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(RuntimeConfig::new(dir.path())).unwrap();
        let engine = FakeEngine::default();
        let id = running(&store, &engine, "svc", 300);
        engine.live.lock().unwrap().clear();

        delete(&store, &engine, &id, false).unwrap();
        assert!(matches!(delete(&store, &engine, &id, false), Err(RunuError::NotFound { .. })));
    }
}
