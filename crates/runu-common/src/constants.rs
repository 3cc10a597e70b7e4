//! System-wide constants and default paths.

use std::time::Duration;

/// Default root directory holding one state directory per instance.
pub const DEFAULT_ROOT_DIR: &str = "/run/runu";

/// File name of the persisted record inside an instance directory.
pub const STATE_FILENAME: &str = "state.json";

/// File name of the advisory lock inside an instance directory.
pub const LOCK_FILENAME: &str = ".lock";

/// Prefix of in-flight temporary record files.
pub const STATE_TEMP_PREFIX: &str = ".state-";

/// How long a writer waits for an instance lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between two attempts at taking a contended lock.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Rounds of re-reading a concurrently modified record before a
/// status repair gives up.
pub const MAX_REPAIR_ATTEMPTS: usize = 3;

/// Major version of the OCI runtime specification records must comply with.
pub const SUPPORTED_SPEC_MAJOR: u64 = 1;

/// Runtime-spec version written into newly created records.
pub const DEFAULT_SPEC_VERSION: &str = "1.1.0";

/// Label key carrying the bundle path, excluded from reported annotations.
pub const BUNDLE_LABEL: &str = "bundle";
