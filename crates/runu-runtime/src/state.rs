//! Persistent state management.
//!
//! Keeps one directory per instance under the root directory:
//!
//! ```text
//! <root>/<id>/state.json   encoded InstanceRecord
//! <root>/<id>/.lock        advisory lock serializing writers
//! ```
//!
//! Records are replaced by writing a temporary file in the same directory
//! and renaming it over `state.json`, so readers never need the lock and
//! never observe a partially written record.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use runu_common::config::RuntimeConfig;
use runu_common::constants::{STATE_FILENAME, STATE_TEMP_PREFIX};
use runu_common::error::{Result, RunuError};
use runu_common::types::InstanceId;
use tracing::Span;

use crate::cancel::CancelToken;
use crate::codec;
use crate::lock::{InstanceLock, LockWait};
use crate::record::InstanceRecord;

/// Prefix of an instance directory that is being removed.
const TOMBSTONE_PREFIX: &str = ".deleted-";

/// Owns the on-disk records under one root directory.
///
/// Every event the store emits is parented to its span, which callers
/// supply through [`StateStore::with_span`].
#[derive(Debug, Clone)]
pub struct StateStore {
    config: RuntimeConfig,
    cancel: CancelToken,
    span: Span,
}

impl StateStore {
    /// Opens the store described by `config`. Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::Config`] if the configuration is invalid.
    pub fn open(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
            span: Span::none(),
        })
    }

    /// Uses `span` as the parent of every event this store logs.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Aborts lock waits once `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Root directory holding the instance directories.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root_dir
    }

    /// Logging handle of this store.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Loads the current record of `id` without taking the lock.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::NotFound`] if no record exists and
    /// [`RunuError::CorruptRecord`] if it cannot be decoded.
    pub fn load(&self, id: &InstanceId) -> Result<InstanceRecord> {
        let path = self.state_path(id);
        tracing::debug!(
            parent: &self.span,
            id = %id,
            path = %path.display(),
            "loading instance record"
        );
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => self.not_found(id),
            _ => RunuError::io(&path, e),
        })?;
        let record = codec::decode(&bytes).map_err(|e| RunuError::CorruptRecord {
            id: id.to_string(),
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if record.id() != id {
            return Err(RunuError::CorruptRecord {
                id: id.to_string(),
                path,
                reason: format!("record belongs to instance {}", record.id()),
            });
        }
        Ok(record)
    }

    /// Runs `f` on the freshly loaded record while holding the instance lock.
    ///
    /// If `f` leaves the record modified it is persisted before the lock is
    /// released. When `f` fails nothing is written. The lock is released on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::LockContention`] or [`RunuError::Cancelled`] if
    /// the lock cannot be taken, [`RunuError::NotFound`] if the record is
    /// gone, any error produced by `f`, or a persistence failure.
    pub fn with_exclusive_access<T, F>(&self, id: &InstanceId, f: F) -> Result<T>
    where
        F: FnOnce(&mut InstanceRecord) -> Result<T>,
    {
        let _lock = self.lock(id)?;
        let original = self.load(id)?;
        let mut record = original.clone();
        let out = f(&mut record)?;
        if record != original {
            self.persist(&record)?;
            tracing::debug!(
                parent: &self.span,
                id = %id,
                phase = %record.phase(),
                pid = record.pid(),
                "instance record updated"
            );
        }
        Ok(out)
    }

    /// Persists a new record, reserving its ID under the root directory.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::AlreadyExists`] if the ID is taken, or an I/O
    /// error if the directories or the record cannot be written.
    pub fn create(&self, record: &InstanceRecord) -> Result<()> {
        let id = record.id();
        create_dir(self.root(), 0o711, true)?;
        let dir = self.instance_dir(id);
        create_dir(&dir, 0o700, false).map_err(|e| match e {
            RunuError::Io { source, .. } if source.kind() == io::ErrorKind::AlreadyExists => {
                RunuError::AlreadyExists {
                    id: id.to_string(),
                    root: self.root().to_path_buf(),
                }
            }
            other => other,
        })?;

        let persisted = self.lock(id).and_then(|_lock| self.persist(record));
        if let Err(e) = persisted {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::warn!(
                    parent: &self.span,
                    id = %id,
                    error = %cleanup,
                    "failed to clean up half-created instance"
                );
            }
            return Err(e);
        }
        tracing::info!(
            parent: &self.span,
            id = %id,
            phase = %record.phase(),
            "instance record created"
        );
        Ok(())
    }

    /// Removes the record of `id`.
    ///
    /// Only `Created` or `Stopped` records without a process may be removed.
    /// The instance directory is first renamed out of the way under the lock,
    /// so concurrent writers waiting on the old lock find the ID gone.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::NotFound`] if no record exists (including on a
    /// repeated delete) and [`RunuError::InvalidState`] if the record is not
    /// deletable.
    pub fn delete(&self, id: &InstanceId) -> Result<()> {
        let tombstone = self
            .root()
            .join(format!("{TOMBSTONE_PREFIX}{id}-{}", std::process::id()));
        {
            let _lock = self.lock(id)?;
            let record = self.load(id)?;
            if !record.is_deletable() {
                return Err(RunuError::InvalidState {
                    id: id.to_string(),
                    phase: record.phase(),
                    operation: "delete",
                });
            }
            let dir = self.instance_dir(id);
            fs::rename(&dir, &tombstone).map_err(|e| RunuError::io(&dir, e))?;
        }
        remove_tombstone(&tombstone)?;
        tracing::info!(parent: &self.span, id = %id, "instance record deleted");
        Ok(())
    }

    /// Loads every record under the root directory, ordered by ID.
    ///
    /// Directories without a record yet (being created) are skipped.
    /// Leftovers of deletes that were interrupted before their directory
    /// was removed are swept.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read or a record is corrupt.
    pub fn list(&self) -> Result<Vec<InstanceRecord>> {
        let root = self.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RunuError::io(root, e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RunuError::io(root, e))?;
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(TOMBSTONE_PREFIX) {
                self.sweep_tombstone(&entry.path());
                continue;
            }
            let Ok(id) = InstanceId::new(name) else {
                continue;
            };
            match self.load(&id) {
                Ok(record) => records.push(record),
                Err(RunuError::NotFound { .. }) => {
                    tracing::trace!(
                        parent: &self.span,
                        id = %id,
                        "skipping instance without record"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(records)
    }

    fn sweep_tombstone(&self, path: &Path) {
        match remove_tombstone(path) {
            Ok(()) => {
                tracing::debug!(
                    parent: &self.span,
                    path = %path.display(),
                    "removed leftover deleted instance"
                );
            }
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    path = %path.display(),
                    error = %e,
                    "failed to remove leftover deleted instance"
                );
            }
        }
    }

    fn lock(&self, id: &InstanceId) -> Result<InstanceLock> {
        InstanceLock::acquire(
            self.root(),
            id,
            LockWait {
                timeout: self.config.lock_timeout,
                poll_interval: self.config.lock_poll_interval,
                cancel: &self.cancel,
            },
        )
        .inspect_err(|e| {
            tracing::debug!(parent: &self.span, id = %id, error = %e, "instance lock not acquired");
        })
    }

    /// Writes the record to a temporary file and renames it into place.
    fn persist(&self, record: &InstanceRecord) -> Result<()> {
        let dir = self.instance_dir(record.id());
        let path = dir.join(STATE_FILENAME);
        let bytes = codec::encode(record)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(STATE_TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| RunuError::io(&dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| RunuError::io(tmp.path(), e))?;
        let _ = tmp
            .persist(&path)
            .map_err(|e| RunuError::io(&path, e.error))?;
        Ok(())
    }

    fn instance_dir(&self, id: &InstanceId) -> PathBuf {
        self.root().join(id.as_str())
    }

    fn state_path(&self, id: &InstanceId) -> PathBuf {
        self.instance_dir(id).join(STATE_FILENAME)
    }

    fn not_found(&self, id: &InstanceId) -> RunuError {
        RunuError::NotFound {
            id: id.to_string(),
            root: self.root().to_path_buf(),
        }
    }
}

/// Removes a renamed-away instance directory. Another process sweeping the
/// same directory concurrently is not an error.
fn remove_tombstone(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RunuError::io(path, e)),
    }
}

#[cfg(unix)]
fn create_dir(path: &Path, mode: u32, recursive: bool) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    let mut builder = fs::DirBuilder::new();
    let _ = builder.recursive(recursive).mode(mode);
    builder.create(path).map_err(|e| RunuError::io(path, e))
}

#[cfg(not(unix))]
fn create_dir(path: &Path, _mode: u32, recursive: bool) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    let _ = builder.recursive(recursive);
    builder.create(path).map_err(|e| RunuError::io(path, e))
}
