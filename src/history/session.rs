//! Bounded log of completed sessions.
//!
//! The log is newest-first and keeps at most [`MAX_ENTRIES`] entries; older
//! entries are evicted silently. Every change is written to storage under
//! [`TIME_ENTRIES_KEY`].

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};

use crate::daemon::clock::Clock;
use crate::storage::{Storage, TIME_ENTRIES_KEY};
use crate::types::SessionEntry;

use super::StoreError;

/// Maximum number of sessions kept in history.
pub const MAX_ENTRIES: usize = 10;

/// Header row of the CSV export.
pub const CSV_HEADER: &str = "Date,Time,Task,Duration,Timestamp";

// ============================================================================
// SessionStore
// ============================================================================

/// History of completed sessions.
pub struct SessionStore {
    /// Entries, newest first
    entries: Vec<SessionEntry>,
    /// Persistence backend
    storage: Arc<Storage>,
    /// Time source for ids and timestamps
    clock: Arc<dyn Clock>,
    /// Last id handed out
    last_id: i64,
}

impl SessionStore {
    /// Loads the persisted history.
    ///
    /// An unreadable history is logged and replaced by an empty one.
    pub fn load(storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Self {
        let mut entries = match storage.get::<Vec<SessionEntry>>(TIME_ENTRIES_KEY) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable session history");
                Vec::new()
            }
        };
        entries.truncate(MAX_ENTRIES);
        let last_id = entries.iter().map(|e| e.id).max().unwrap_or(0);

        Self {
            entries,
            storage,
            clock,
            last_id,
        }
    }

    /// Records a finished session at the front of the log.
    pub fn append(&mut self, task: &str, minutes: u64, seconds: u64) -> SessionEntry {
        let now_ms = self.clock.now_ms();
        let id = now_ms.max(self.last_id + 1);
        self.last_id = id;

        let utc = DateTime::from_timestamp_millis(now_ms).unwrap_or_default();
        let local = utc.with_timezone(&Local);

        let entry = SessionEntry {
            id,
            task: task.to_string(),
            duration_text: format_duration(minutes, seconds),
            timestamp_iso: format_timestamp(&utc),
            date_text: format_date(&local),
            time_text: format_time(&local),
        };

        self.entries.insert(0, entry.clone());
        if self.entries.len() > MAX_ENTRIES {
            let evicted = self.entries.len() - MAX_ENTRIES;
            self.entries.truncate(MAX_ENTRIES);
            tracing::debug!(evicted, "oldest sessions evicted");
        }

        tracing::info!(task = %entry.task, duration = %entry.duration_text, "session recorded");
        self.persist();
        entry
    }

    /// Removes the entry at `index` in the newest-first list.
    ///
    /// Out-of-range indexes are ignored.
    pub fn delete_at(&mut self, index: usize) -> Option<SessionEntry> {
        if index >= self.entries.len() {
            tracing::debug!(index, len = self.entries.len(), "delete index out of range");
            return None;
        }

        let removed = self.entries.remove(index);
        self.persist();
        Some(removed)
    }

    /// Entries, newest first.
    pub fn list(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the log as CSV in list order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyExport`] when there is nothing to export.
    pub fn to_csv(&self) -> Result<String, StoreError> {
        if self.entries.is_empty() {
            return Err(StoreError::EmptyExport);
        }

        let mut lines = Vec::with_capacity(self.entries.len() + 1);
        lines.push(CSV_HEADER.to_string());
        for entry in &self.entries {
            let row = [
                entry.date_text.as_str(),
                entry.time_text.as_str(),
                entry.task.as_str(),
                entry.duration_text.as_str(),
                entry.timestamp_iso.as_str(),
            ]
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<_>>()
            .join(",");
            lines.push(row);
        }

        Ok(lines.join("\n"))
    }

    fn persist(&self) {
        if let Err(e) = self.storage.set(TIME_ENTRIES_KEY, &self.entries) {
            tracing::warn!(error = %e, "failed to persist session history");
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Renders a duration as `M:SS`.
pub fn format_duration(minutes: u64, seconds: u64) -> String {
    format!("{}:{:02}", minutes, seconds)
}

/// Renders an instant as ISO-8601 UTC with millisecond precision.
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders the date part as `M/D/YYYY`.
pub fn format_date<Tz: TimeZone>(instant: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.format("%-m/%-d/%Y").to_string()
}

/// Renders the time part as `H:MM:SS AM`.
pub fn format_time<Tz: TimeZone>(instant: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.format("%-I:%M:%S %p").to_string()
}

/// Quotes a CSV field when it contains a delimiter, quote or line break.
fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

// ============================================================================
// Tests
// ============================================================================
