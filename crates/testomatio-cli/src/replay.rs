//! Replaying a recorded host event stream into the listeners.
//!
//! A recording is a JSON-lines file, one [`HostEvent`] per line. Blank lines
//! are skipped. A recording cut short before `run_end` is closed as if the
//! run had ended.

use std::fs;
use std::path::Path;

use tracing::debug;

use testomatio_core::listener::{ImportListener, ReportListener, RunReport};
use testomatio_core::{HostEvent, SyncError, SyncOutcome};

// =============================================================================
// Reading
// =============================================================================

/// Reads a recorded event stream.
pub fn read_events(path: &Path) -> Result<Vec<HostEvent>, Box<dyn std::error::Error>> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    parse_events(&content).map_err(|(line, e)| format!("{}:{}: {}", path.display(), line, e).into())
}

/// Parses event lines. Errors carry the 1-based line number.
pub fn parse_events(content: &str) -> Result<Vec<HostEvent>, (usize, serde_json::Error)> {
    let mut events = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if let Some(event) = HostEvent::from_json_line(line).map_err(|e| (number + 1, e))? {
            events.push(event);
        }
    }

    if events.last() != Some(&HostEvent::RunEnd) {
        debug!("Recording has no run_end, closing the run");
        events.push(HostEvent::RunEnd);
    }
    Ok(events)
}

// =============================================================================
// Replay
// =============================================================================

/// Feeds events into the import listener. Returns the sync outcome of the
/// first `run_end`.
pub async fn replay_import(
    listener: &mut ImportListener,
    events: &[HostEvent],
) -> Result<Option<SyncOutcome>, SyncError> {
    let mut outcome = None;
    for event in events {
        if let Some(done) = listener.handle(event).await? {
            outcome.get_or_insert(done);
        }
    }
    Ok(outcome)
}

/// Feeds events into the report listener. Returns the report of the first
/// `run_end`.
pub async fn replay_report(listener: &mut ReportListener, events: &[HostEvent]) -> Option<RunReport> {
    let mut report = None;
    for event in events {
        if let Some(done) = listener.handle(event).await {
            report.get_or_insert(done);
        }
    }
    report
}
