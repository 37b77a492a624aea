//! Append-only JSONL provenance event log.

use crate::core::error::{Error, Result};
use crate::core::types::{ProvenanceEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current UTC time as ISO 8601 (`2026-10-19T14:00:00Z`).
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("r-{}", &id[..12])
}

/// Derive the event log path for a machine.
pub fn event_log_path(state_dir: &Path, machine: &str) -> PathBuf {
    state_dir.join(machine).join("events.jsonl")
}

/// Append an event to the machine's event log.
pub fn append_event(state_dir: &Path, machine: &str, event: ProvenanceEvent) -> Result<()> {
    let path = event_log_path(state_dir, machine);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::State(format!("cannot create state dir: {}", e)))?;
    }

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te)
        .map_err(|e| Error::State(format!("JSON serialize error: {}", e)))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::State(format!("cannot open event log {}: {}", path.display(), e)))?;

    writeln!(file, "{}", json)?;

    Ok(())
}

/// Read all events from a machine's log. Missing log yields no events.
pub fn read_events(state_dir: &Path, machine: &str) -> Result<Vec<TimestampedEvent>> {
    let path = event_log_path(state_dir, machine);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).map_err(|e| Error::Parse {
                origin: path.display().to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}
