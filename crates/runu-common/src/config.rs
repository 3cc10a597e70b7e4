//! Global configuration model for the runu runtime.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RunuError};

/// Root configuration for a runtime invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory holding one state directory per instance.
    pub root_dir: PathBuf,
    /// Upper bound on waiting for an instance lock.
    pub lock_timeout: Duration,
    /// Delay between attempts at a contended lock.
    pub lock_poll_interval: Duration,
}

impl RuntimeConfig {
    /// Creates a configuration rooted at `root_dir` with default timings.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Overrides the lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Overrides the lock poll interval.
    #[must_use]
    pub const fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RunuError::Config`] if the root directory is empty or the
    /// poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(RunuError::Config {
                message: "state directory (--root) is not set".into(),
            });
        }
        if self.lock_poll_interval.is_zero() {
            return Err(RunuError::Config {
                message: "lock poll interval must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(crate::constants::DEFAULT_ROOT_DIR),
            lock_timeout: crate::constants::DEFAULT_LOCK_TIMEOUT,
            lock_poll_interval: crate::constants::DEFAULT_LOCK_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_root_is_rejected() {
        let config = RuntimeConfig::new("");
        assert!(matches!(config.validate(), Err(RunuError::Config { .. })));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = RuntimeConfig::new("/tmp/x").with_lock_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
