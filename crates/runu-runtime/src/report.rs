//! OCI runtime state document.
//!
//! Field names and presence rules follow the runtime-spec state schema:
//! <https://github.com/opencontainers/runtime-spec/blob/v1.1.0/runtime.md#state>

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use runu_common::constants::BUNDLE_LABEL;
use runu_common::error::Result;
use runu_common::types::{InstanceId, Status};
use serde::Serialize;

use crate::probe::ProcessProbe;
use crate::record::InstanceRecord;
use crate::state::StateStore;
use crate::status;

/// Serializable runtime state of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalState {
    /// Runtime-spec version the state complies with.
    pub oci_version: String,
    /// Instance identifier.
    pub id: String,
    /// Resolved status.
    pub status: Status,
    /// Absolute path of the bundle directory.
    pub bundle: String,
    /// Init process PID; 0 when stopped.
    pub pid: u32,
    /// User annotations, omitted when empty.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Absolute path of the root filesystem (runc extension).
    pub rootfs: String,
    /// Creation time in UTC (runc extension).
    pub created: DateTime<Utc>,
}

impl ExternalState {
    /// Serializes the state as two-space indented JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Maps a record and its resolved status onto the external schema.
///
/// The PID is reported as 0 whenever the status is `stopped`, whatever the
/// record still says.
#[must_use]
pub fn report(record: &InstanceRecord, status: Status) -> ExternalState {
    let pid = match status {
        Status::Stopped => 0,
        _ => record.pid(),
    };
    let annotations = record
        .labels()
        .iter()
        .filter(|(key, _)| key.as_str() != BUNDLE_LABEL)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ExternalState {
        oci_version: record.spec_version().to_owned(),
        id: record.id().to_string(),
        status,
        bundle: record.bundle_path().to_string_lossy().into_owned(),
        pid,
        annotations,
        rootfs: record.rootfs_path().to_string_lossy().into_owned(),
        created: record.created_at(),
    }
}

/// Loads, resolves (repairing stale records), and reports instance `id`.
///
/// # Errors
///
/// Returns the errors of [`status::resolve_and_repair`].
pub fn query(
    store: &StateStore,
    id: &InstanceId,
    probe: &dyn ProcessProbe,
) -> Result<ExternalState> {
    let (record, status) = status::resolve_and_repair(store, id, probe)?;
    Ok(report(&record, status))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use runu_common::types::StartTime;

    use super::*;

    fn record(labels: &[(&str, &str)]) -> InstanceRecord {
        InstanceRecord::new(
            InstanceId::new("my-unikernel").unwrap(),
            "/srv/bundle",
            "/srv/bundle/rootfs",
        )
        .unwrap()
        .with_created_at(Utc.with_ymd_and_hms(2023, 6, 1, 8, 30, 0).unwrap())
        .with_labels(labels.iter().copied())
    }

    #[test]
    fn stopped_report_has_zero_pid_and_no_annotations() {
        let mut r = record(&[]);
        r.mark_stopped();
        let json: serde_json::Value =
            serde_json::from_slice(&report(&r, Status::Stopped).to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["pid"], 0);
        assert!(json.get("annotations").is_none());
    }

    #[test]
    fn stale_pid_is_masked_when_stopped() {
        let mut r = record(&[]);
        r.mark_created().unwrap();
        r.mark_running(4821, StartTime::new(1)).unwrap();
        assert_eq!(report(&r, Status::Stopped).pid, 0);
        assert_eq!(report(&r, Status::Running).pid, 4821);
    }

    #[test]
    fn bundle_label_is_not_an_annotation() {
        let r = record(&[("bundle", "/srv/bundle"), ("org.example/tier", "edge")]);
        let state = report(&r, Status::Created);
        assert_eq!(state.annotations.len(), 1);
        assert_eq!(state.annotations["org.example/tier"], "edge");
    }

    #[test]
    fn document_uses_schema_field_names_in_order() {
        let r = record(&[("k", "v")]);
        let text = String::from_utf8(report(&r, Status::Created).to_json().unwrap()).unwrap();
        let expected = r#"{
  "ociVersion": "1.1.0",
  "id": "my-unikernel",
  "status": "created",
  "bundle": "/srv/bundle",
  "pid": 0,
  "annotations": {
    "k": "v"
  },
  "rootfs": "/srv/bundle/rootfs",
  "created": "2023-06-01T08:30:00Z"
}"#;
        assert_eq!(text, expected);
    }
}
