//! Formatted output helpers for CLI commands.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use runu_runtime::report::ExternalState;

/// Formats a creation timestamp to whole seconds, e.g. `2024-03-01T12:00:00Z`.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Renders instance states as aligned columns with a header row.
#[must_use]
pub fn status_table(states: &[ExternalState]) -> String {
    let id_width = states
        .iter()
        .map(|s| s.id.len())
        .chain(std::iter::once("ID".len()))
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<8}  {:<8}  {:<20}  {}",
        "ID", "PID", "STATUS", "CREATED", "BUNDLE"
    );
    for s in states {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<8}  {:<8}  {:<20}  {}",
            s.id,
            s.pid,
            s.status,
            format_timestamp(s.created),
            s.bundle
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use runu_common::types::Status;

    use super::*;

    fn state(id: &str, status: Status, pid: u32) -> ExternalState {
        ExternalState {
            oci_version: "1.1.0".into(),
            id: id.into(),
            status,
            bundle: format!("/srv/{id}"),
            pid,
            annotations: BTreeMap::new(),
            rootfs: format!("/srv/{id}/rootfs"),
            created: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn format_timestamp_drops_subseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(format_timestamp(ts), "2024-03-01T12:00:00Z");
    }

    #[test]
    fn status_table_has_header_and_one_row_per_instance() {
        let table = status_table(&[
            state("web-1", Status::Running, 4821),
            state("my-unikernel", Status::Stopped, 0),
        ]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID "));
        assert!(lines[1].starts_with("web-1 "));
        assert!(lines[1].contains("running"));
        assert!(lines[2].contains("stopped"));
    }

    #[test]
    fn status_table_of_nothing_is_just_the_header() {
        assert_eq!(status_table(&[]).lines().count(), 1);
    }
}
