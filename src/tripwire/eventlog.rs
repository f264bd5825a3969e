//! IF-015: Append-only JSONL provenance log per working directory.

use crate::core::types::{DeploymentEvent, TimestampedEvent};
use chrono::{SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

/// RFC 3339 UTC timestamp with second precision.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Event log path inside a working directory.
pub fn event_log_path(working_dir: &Path) -> PathBuf {
    working_dir.join("events.jsonl")
}

/// Append an event to the working directory's event log.
pub fn append_event(working_dir: &Path, event: DeploymentEvent) -> Result<(), String> {
    std::fs::create_dir_all(working_dir)
        .map_err(|e| format!("cannot create {}: {}", working_dir.display(), e))?;
    let path = event_log_path(working_dir);

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Read back every event in the log. Missing log → empty.
pub fn read_events(working_dir: &Path) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(working_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| format!("bad event line: {}", e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if015_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_if015_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_if015_event_log_path() {
        let p = event_log_path(Path::new("/work/ml-prod_plan"));
        assert_eq!(p, PathBuf::from("/work/ml-prod_plan/events.jsonl"));
    }

    #[test]
    fn test_if015_append_event() {
        let dir = tempfile::tempdir().unwrap();
        let event = DeploymentEvent::RunStarted {
            run_id: "r-abc".to_string(),
            dry_run: true,
            artifact_digest: "blake3:xxx".to_string(),
        };
        append_event(dir.path(), event).unwrap();

        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(content.contains("run_started"));
        assert!(content.contains("r-abc"));
    }

    #[test]
    fn test_if015_append_multiple_and_read() {
        let dir = tempfile::tempdir().unwrap();
        for step in ["init", "plan", "apply"] {
            let event = DeploymentEvent::StepCompleted {
                run_id: "r-1".to_string(),
                step: step.to_string(),
                exit_code: 0,
                duration_seconds: 0.5,
            };
            append_event(dir.path(), event).unwrap();
        }
        let events = read_events(dir.path()).unwrap();
        assert_eq!(events.len(), 3);
        match &events[2].event {
            DeploymentEvent::StepCompleted { step, .. } => assert_eq!(step, "apply"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_if015_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(dir.path()).unwrap().is_empty());
    }
}
