//! Process liveness probing and signalling.
//!
//! The runtime never inspects processes directly; it asks a
//! [`ProcessProbe`], which the sandbox engine provides. On Linux the probe
//! reads `/proc/<pid>/stat` and compares the kernel start time against the
//! recorded token, which catches PIDs recycled for unrelated processes.

use nix::sys::signal::Signal;
use runu_common::error::RunuError;
use runu_common::types::{InstanceId, Phase, StartTime};
use thiserror::Error;

/// The probe could not answer for a process.
#[derive(Debug, Error)]
#[error("process {pid}: {message}")]
pub struct ProbeError {
    /// Process that was probed.
    pub pid: u32,
    /// Description of the failure.
    pub message: String,
}

impl ProbeError {
    /// Creates a failure report for `pid`.
    pub fn new(pid: u32, message: impl Into<String>) -> Self {
        Self {
            pid,
            message: message.into(),
        }
    }

    /// Attaches the instance whose init process was probed.
    #[must_use]
    pub fn for_instance(self, id: &InstanceId, phase: Phase) -> RunuError {
        RunuError::ProbeFailure {
            id: id.to_string(),
            phase,
            pid: self.pid,
            message: self.message,
        }
    }
}

/// Result of a probe call.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// What the probe found at a recorded PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The recorded process is alive.
    Alive,
    /// No live process has the PID (gone or a zombie).
    Exited,
    /// The PID now belongs to a different process.
    Recycled {
        /// Start time of the process currently holding the PID.
        current: StartTime,
    },
}

/// Liveness and control interface of the underlying sandbox engine.
pub trait ProcessProbe: Send + Sync {
    /// Returns the start time of the live process `pid`, or `None` if no
    /// live (non-zombie) process has that PID.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`] if the check cannot be performed.
    fn start_time(&self, pid: u32) -> ProbeResult<Option<StartTime>>;

    /// Sends `signal` to process `pid`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`] if the signal cannot be delivered.
    fn signal(&self, pid: u32, signal: Signal) -> ProbeResult<()>;

    /// Classifies the recorded process `(pid, start_time)`.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`ProcessProbe::start_time`].
    fn liveness(&self, pid: u32, start_time: StartTime) -> ProbeResult<Liveness> {
        Ok(match self.start_time(pid)? {
            None => Liveness::Exited,
            Some(current) if current == start_time => Liveness::Alive,
            Some(current) => Liveness::Recycled { current },
        })
    }

    /// Whether the recorded process `(pid, start_time)` is still alive.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`ProcessProbe::start_time`].
    fn is_alive(&self, pid: u32, start_time: StartTime) -> ProbeResult<bool> {
        Ok(self.liveness(pid, start_time)? == Liveness::Alive)
    }
}

/// Probe backed by Linux procfs and `kill(2)`.
#[derive(Debug, Clone, Default)]
pub struct ProcfsProbe;

impl ProcfsProbe {
    /// Creates a procfs probe.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessProbe for ProcfsProbe {
    fn start_time(&self, pid: u32) -> ProbeResult<Option<StartTime>> {
        if pid == 0 {
            return Ok(None);
        }
        let path = format!("/proc/{pid}/stat");
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProbeError::new(pid, format!("reading {path}: {e}")));
            }
        };
        let Some(stat) = parse_stat(&contents) else {
            return Err(ProbeError::new(pid, format!("unparseable {path}")));
        };
        if stat.is_dead() {
            tracing::trace!(pid, state = %stat.state, "process is a zombie");
            return Ok(None);
        }
        Ok(Some(stat.start_time))
    }

    fn signal(&self, pid: u32, signal: Signal) -> ProbeResult<()> {
        send_signal(pid, signal)
    }
}

/// Probe for platforms without procfs. Every check fails.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedProbe;

impl ProcessProbe for UnsupportedProbe {
    fn start_time(&self, pid: u32) -> ProbeResult<Option<StartTime>> {
        Err(ProbeError::new(
            pid,
            format!("process probing is not supported on {}", std::env::consts::OS),
        ))
    }

    fn signal(&self, pid: u32, signal: Signal) -> ProbeResult<()> {
        send_signal(pid, signal)
    }
}

/// Auto-detects the probe for the current platform.
#[must_use]
pub fn detect_probe() -> Box<dyn ProcessProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcfsProbe::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnsupportedProbe)
    }
}

fn send_signal(pid: u32, signal: Signal) -> ProbeResult<()> {
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ProbeError::new(pid, "not a signallable pid"))?;
    nix::sys::signal::kill(Pid::from_raw(raw), signal).map_err(|errno| {
        ProbeError::new(pid, format!("sending {}: {}", signal.as_str(), errno.desc()))
    })?;
    tracing::debug!(pid, signal = signal.as_str(), "signal sent");
    Ok(())
}

/// Fields of `/proc/<pid>/stat` the probe relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    state: char,
    start_time: StartTime,
}

impl ProcStat {
    const fn is_dead(self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parses the state (field 3) and start time (field 22) of a stat line.
///
/// The command name (field 2) is parenthesised and may itself contain
/// spaces and parentheses, so fields are counted from the last `)`.
fn parse_stat(contents: &str) -> Option<ProcStat> {
    let (_, rest) = contents.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let state = fields.first()?.chars().next()?;
    let start_time = fields.get(19)?.parse().ok()?;
    Some(ProcStat {
        state,
        start_time: StartTime::new(start_time),
    })
}
