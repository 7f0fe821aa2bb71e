//! Core data types for the time tracker.
//!
//! This module defines the data structures used for:
//! - Canonical timer state and its persisted layout
//! - History entries
//! - IPC request/response serialization
//! - Push messages sent to attached listeners

use serde::{Deserialize, Serialize};

// ============================================================================
// TimerMode
// ============================================================================

/// The kind of session the timer is measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    /// Open-ended count-up timer for a named task
    #[default]
    Manual,
    /// Fixed-length focused work interval (Pomodoro)
    Work,
    /// Fixed-length break interval
    Break,
}

impl TimerMode {
    /// Returns the string representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Manual => "manual",
            TimerMode::Work => "work",
            TimerMode::Break => "break",
        }
    }

    /// Returns the capitalized label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            TimerMode::Manual => "Manual",
            TimerMode::Work => "Work",
            TimerMode::Break => "Break",
        }
    }

    /// Returns true for modes that count down towards a target.
    pub fn is_countdown(&self) -> bool {
        matches!(self, TimerMode::Work | TimerMode::Break)
    }

    /// Notification text emitted when a countdown in this mode completes.
    pub fn completion_message(&self) -> Option<&'static str> {
        match self {
            TimerMode::Manual => None,
            TimerMode::Work => Some("Pomodoro complete! Time for a break."),
            TimerMode::Break => Some("Break is over. Ready to focus?"),
        }
    }
}

// ============================================================================
// TimerState
// ============================================================================

/// Canonical timer state.
///
/// Serialized with camelCase keys; this is both the persisted `timerState`
/// value and the snapshot handed to listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerState {
    /// Whether the timer is currently counting
    pub is_running: bool,
    /// Epoch milliseconds at which the current run began, shifted back by
    /// already-elapsed time on resume
    pub start_time_epoch_ms: Option<i64>,
    /// Accumulated duration of the current session
    pub elapsed_ms: u64,
    /// Task being timed; empty when idle
    pub current_task: String,
    /// Current mode
    pub mode: TimerMode,
    /// Countdown target in seconds; 0 means none
    pub target_duration_sec: u64,
    /// Completed work cycles (tracked only)
    pub pomodoro_count: u32,
    /// Whether a stop has already handed out this run's result
    pub reported: bool,
}

impl TimerState {
    /// Creates an idle state in manual mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole seconds elapsed (floor).
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_ms / 1000
    }

    /// Target duration in milliseconds, or 0 if there is no target.
    pub fn target_ms(&self) -> u64 {
        self.target_duration_sec.saturating_mul(1000)
    }

    /// Returns true if a countdown target is set.
    pub fn has_target(&self) -> bool {
        self.target_duration_sec > 0
    }

    /// Seconds left until the target, if one is set.
    pub fn remaining_seconds(&self) -> Option<u64> {
        self.has_target()
            .then(|| self.target_duration_sec.saturating_sub(self.elapsed_seconds()))
    }

    /// Seconds to render: remaining time for countdowns, elapsed otherwise.
    pub fn display_seconds(&self) -> u64 {
        self.remaining_seconds()
            .unwrap_or_else(|| self.elapsed_seconds())
    }
}

/// Result of stopping the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    /// Final elapsed duration in whole seconds
    pub duration_sec: u64,
    /// Task that was being timed
    pub task: String,
    /// The run was already reported by an earlier stop
    #[serde(default)]
    pub already_reported: bool,
}

impl StopResult {
    /// Splits the duration into (minutes, seconds).
    pub fn minutes_seconds(&self) -> (u64, u64) {
        (self.duration_sec / 60, self.duration_sec % 60)
    }

    /// Returns true if the stopped run is worth recording in history.
    pub fn is_recordable(&self) -> bool {
        !self.already_reported && !self.task.is_empty() && self.duration_sec > 0
    }
}

/// Countdown completion notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Mode that completed
    pub mode: TimerMode,
    /// Task that was being timed
    pub task: String,
    /// Notification text
    pub message: String,
}

// ============================================================================
// Push messages
// ============================================================================

/// Message pushed to attached listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerMessage {
    /// Fresh snapshot, sent once per tick
    TimerUpdate(TimerState),
    /// A work or break countdown reached its target
    TimerComplete(Completion),
}

// ============================================================================
// SessionEntry
// ============================================================================

/// One completed session in the history log.
///
/// The serialized field names are shared by the persisted `timeEntries`
/// list and the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Creation-time-derived identifier (epoch milliseconds, strictly increasing)
    pub id: i64,
    /// Task name
    pub task: String,
    /// Duration rendered as `M:SS`
    #[serde(rename = "duration")]
    pub duration_text: String,
    /// ISO-8601 UTC timestamp
    #[serde(rename = "timestamp")]
    pub timestamp_iso: String,
    /// Local date, e.g. `1/1/2024`
    #[serde(rename = "date")]
    pub date_text: String,
    /// Local time, e.g. `9:00:00 AM`
    #[serde(rename = "time")]
    pub time_text: String,
}

// ============================================================================
// IPC Types
// ============================================================================

/// IPC request from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpcRequest {
    /// Start a manual count-up timer
    StartTimer {
        /// Task name
        task: String,
    },
    /// Start a work countdown
    StartPomodoro {
        /// Task name
        task: String,
        /// Countdown length
        #[serde(rename = "durationSec")]
        duration_sec: u64,
    },
    /// Start a break countdown
    StartBreak {
        /// Countdown length
        #[serde(rename = "durationSec")]
        duration_sec: u64,
    },
    /// Stop the timer and report the final duration
    StopTimer,
    /// Clear the timer back to idle
    ResetTimer,
    /// Query the current state
    GetTimerState,
    /// Append a finished session to history
    RecordSession {
        /// Task name
        task: String,
        /// Session length
        #[serde(rename = "durationSec")]
        duration_sec: u64,
    },
    /// List history, newest first
    ListSessions,
    /// Delete a history entry by position
    DeleteSession {
        /// Zero-based position in the newest-first list
        index: usize,
    },
    /// Render history as CSV
    ExportCsv,
    /// Add a task name to the catalog
    AddTask {
        /// Task name
        name: String,
    },
    /// List the task catalog
    ListTasks,
    /// Keep the connection open and stream push messages
    Subscribe,
}

/// Response data for IPC responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Timer snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TimerState>,
    /// Final duration reported by STOP_TIMER
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
    /// Task reported by STOP_TIMER
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Set by STOP_TIMER when the run was already reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_reported: Option<bool>,
    /// Newly recorded history entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<SessionEntry>,
    /// History, newest first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionEntry>>,
    /// Task catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<String>>,
    /// CSV export document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
}

impl ResponseData {
    /// Creates response data carrying a timer snapshot.
    pub fn from_timer_state(state: TimerState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Creates response data for a stopped timer.
    pub fn from_stop_result(result: StopResult) -> Self {
        Self {
            duration_sec: Some(result.duration_sec),
            task: Some(result.task),
            already_reported: result.already_reported.then_some(true),
            ..Self::default()
        }
    }

    /// Creates response data carrying a single history entry.
    pub fn from_entry(entry: SessionEntry) -> Self {
        Self {
            entry: Some(entry),
            ..Self::default()
        }
    }

    /// Creates response data carrying the history list.
    pub fn from_sessions(sessions: Vec<SessionEntry>) -> Self {
        Self {
            sessions: Some(sessions),
            ..Self::default()
        }
    }

    /// Creates response data carrying the task catalog.
    pub fn from_tasks(tasks: Vec<String>) -> Self {
        Self {
            tasks: Some(tasks),
            ..Self::default()
        }
    }

    /// Creates response data carrying a CSV document.
    pub fn from_csv(csv: String) -> Self {
        Self {
            csv: Some(csv),
            ..Self::default()
        }
    }
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Whether the command succeeded
    pub success: bool,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
