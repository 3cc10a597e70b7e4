//! Cross-process exclusive lock scoped to one instance.
//!
//! The lock is an advisory `flock` on `<root>/<id>/.lock`, so it is
//! shared by every process acting on the same root directory and released
//! by the kernel if the holder dies. Waiting is bounded and cancellable.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use runu_common::error::{Result, RunuError};
use runu_common::types::InstanceId;

use crate::cancel::CancelToken;

/// Bounds on how a writer waits for a contended lock.
#[derive(Debug, Clone, Copy)]
pub struct LockWait<'a> {
    /// Give up with `LockContention` after this long.
    pub timeout: Duration,
    /// Sleep between attempts.
    pub poll_interval: Duration,
    /// Aborts the wait when cancelled.
    pub cancel: &'a CancelToken,
}

/// A held instance lock. Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquires the exclusive lock of instance `id` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::NotFound`] if the instance directory does not
    /// exist, [`RunuError::Cancelled`] if `wait.cancel` fires first, or
    /// [`RunuError::LockContention`] once `wait.timeout` has elapsed.
    pub fn acquire(root: &Path, id: &InstanceId, wait: LockWait<'_>) -> Result<Self> {
        let path = root
            .join(id.as_str())
            .join(runu_common::constants::LOCK_FILENAME);
        let started = Instant::now();
        let mut file = open_lock_file(root, id, &path)?;

        loop {
            if wait.cancel.is_cancelled() {
                return Err(RunuError::Cancelled {
                    id: id.to_string(),
                    root: root.to_path_buf(),
                });
            }

            match file.try_lock_exclusive() {
                Ok(()) => {
                    if is_still_linked(&file, &path)? {
                        tracing::trace!(
                            id = %id,
                            waited = ?started.elapsed(),
                            "instance lock acquired"
                        );
                        return Ok(Self { file, path });
                    }
                    // The instance was deleted (and possibly re-created) while
                    // we waited; the lock we hold guards nothing. Replacing
                    // the handle closes it, which releases that lock.
                    file = open_lock_file(root, id, &path)?;
                    continue;
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(RunuError::io(&path, e)),
            }

            let waited = started.elapsed();
            if waited >= wait.timeout {
                return Err(RunuError::LockContention {
                    id: id.to_string(),
                    root: root.to_path_buf(),
                    waited,
                });
            }
            std::thread::sleep(wait.poll_interval.min(wait.timeout - waited));
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release instance lock"
            );
        }
    }
}

fn open_lock_file(root: &Path, id: &InstanceId, path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RunuError::NotFound {
                id: id.to_string(),
                root: root.to_path_buf(),
            },
            _ => RunuError::io(path, e),
        })
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Whether the open lock file is still the one linked at `path`.
#[cfg(unix)]
fn is_still_linked(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata().map_err(|e| RunuError::io(path, e))?;
    match std::fs::metadata(path) {
        Ok(linked) => Ok(held.dev() == linked.dev() && held.ino() == linked.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RunuError::io(path, e)),
    }
}

#[cfg(not(unix))]
fn is_still_linked(_file: &File, path: &Path) -> Result<bool> {
    Ok(path.exists())
}
