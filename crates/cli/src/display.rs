// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Fieldline Contributors

use chrono::{DateTime, SecondsFormat, Utc};
use fl_core::{CorruptEntry, QueueEntry, Record};
use serde_json::Value;

/// Longest `last_error` shown in text listings.
const ERROR_WIDTH: usize = 60;

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// One line per queue entry:
/// `<id>  <state>  <op> <collection>/<record>  retries=<n>  [error]`.
pub fn format_entry(entry: &QueueEntry) -> String {
    let mut line = format!(
        "{}  {:<7}  {} {}/{}  retries={}  {}",
        entry.id,
        entry.state.as_str(),
        entry.operation,
        entry.collection,
        entry.record_id,
        entry.retry_count,
        timestamp(&entry.enqueued_at),
    );
    if let Some(err) = &entry.last_error {
        line.push_str("  ");
        line.push_str(&truncate(err, ERROR_WIDTH));
    }
    line
}

pub fn format_corrupt(entry: &CorruptEntry) -> String {
    format!("{}  quarantined  {}", entry.id, entry.reason)
}

/// `<id>  synced|unsynced  <updated_at>  <fields>`
pub fn format_record(record: &Record) -> String {
    let state = if record.synced { "synced" } else { "unsynced" };
    format!(
        "{}  {:<8}  {}  {}",
        record.id,
        state,
        timestamp(&record.updated_at),
        Value::Object(record.fields.clone()),
    )
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
