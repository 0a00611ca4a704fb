//! Replaying captured change events.
//!
//! Events are read from newline-delimited JSON, one [`RawChangeEvent`] per
//! line, and dispatched in file order. Replay stops at the first failing
//! event: later events may depend on the directory state it should have
//! produced.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use sync_core::{Dispatcher, RawChangeEvent, RelationalSource};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events dispatched successfully
    pub events: usize,
    /// Handler invocations across all events
    pub handler_runs: usize,
}

/// Parse newline-delimited JSON events. Blank lines are skipped.
pub fn parse_events<R: BufRead>(reader: R) -> Result<Vec<RawChangeEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let event: RawChangeEvent = serde_json::from_str(&line)
            .map_err(|e| anyhow!("Error parsing event at line {line_number}: {e}"))?;
        events.push(event);
    }
    Ok(events)
}

pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<RawChangeEvent>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open events file {}", path.display()))?;
    parse_events(BufReader::new(file))
        .with_context(|| format!("Invalid events file {}", path.display()))
}

/// Dispatch `events` in order, stopping at the first failure.
pub async fn replay_events(
    dispatcher: &Dispatcher,
    events: Vec<RawChangeEvent>,
    source: &mut dyn RelationalSource,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (index, event) in events.into_iter().enumerate() {
        let description = format!("{} on {}", event.kind, event.source_table);
        let runs = dispatcher
            .dispatch_raw(event, source)
            .await
            .with_context(|| format!("event #{} ({description}) failed", index + 1))?;
        summary.events += 1;
        summary.handler_runs += runs;
    }
    info!(
        "replayed {} event(s), {} handler run(s)",
        summary.events, summary.handler_runs
    );
    Ok(summary)
}
