//! Display utilities for the time tracker CLI.
//!
//! `render_*` functions build the text; `show_*` functions print it.

use std::path::Path;

use crate::types::{Completion, SessionEntry, StopResult, TimerState};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows a success message for a started run.
    pub fn show_start_success(state: &TimerState) {
        println!("> {} timer started", state.mode.label());
        println!("  Task: {}", state.current_task);
        if state.has_target() {
            println!("  Duration: {}", Self::format_clock(state.target_duration_sec));
        }
    }

    /// Shows a success message for a stopped run.
    pub fn show_stop_success(result: &StopResult, entry: Option<&SessionEntry>) {
        println!("{}", Self::render_stop(result, entry));
    }

    /// Shows a success message for a reset.
    pub fn show_reset_success() {
        println!("[] Timer reset");
    }

    /// Shows the current timer status.
    pub fn show_status(state: &TimerState) {
        println!("Time Tracker Status");
        println!("───────────────────");
        println!("{}", Self::render_status(state));
    }

    /// Rewrites the live timer line in place.
    pub fn show_update(state: &TimerState) {
        use std::io::Write;

        print!("\r\x1b[2K{}", Self::render_timer_line(state));
        let _ = std::io::stdout().flush();
    }

    /// Shows a countdown completion notice.
    pub fn show_completion(completion: &Completion) {
        println!();
        println!("* {}", completion.message);
        if !completion.task.is_empty() {
            println!("  Task: {}", completion.task);
        }
    }

    /// Shows the session history.
    pub fn show_history(entries: &[SessionEntry]) {
        println!("{}", Self::render_history(entries));
    }

    /// Shows the task catalog.
    pub fn show_tasks(tasks: &[String]) {
        if tasks.is_empty() {
            println!("No tasks yet. Add one with 'time-tracker task add <NAME>'");
            return;
        }
        for task in tasks {
            println!("- {}", task);
        }
    }

    /// Shows a successful CSV export.
    pub fn show_export_success(path: &Path, rows: usize) {
        println!("* Exported {} session(s) to {}", rows, path.display());
    }

    /// Shows that the session was posted to the webhook.
    pub fn show_webhook_success(url: &str) {
        println!("  Sent to webhook {}", url);
    }

    /// Shows a webhook failure without failing the command.
    pub fn show_webhook_failure(message: &str) {
        eprintln!("warning: session kept locally; {}", message);
    }

    /// Shows an informational message.
    pub fn show_message(message: &str) {
        if !message.is_empty() {
            println!("{}", message);
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("error: {}", message);
    }

    /// Renders the stop summary.
    pub fn render_stop(result: &StopResult, entry: Option<&SessionEntry>) -> String {
        let (minutes, seconds) = result.minutes_seconds();
        let mut out = String::from("[] Timer stopped");

        if !result.task.is_empty() {
            out.push_str(&format!("\n  Task: {}", result.task));
        }
        out.push_str(&format!("\n  Duration: {}:{:02}", minutes, seconds));
        if entry.is_some() {
            out.push_str("\n  Saved to history");
        } else if result.already_reported {
            out.push_str("\n  Already stopped, not recorded again");
        }
        out
    }

    /// Renders the status block.
    pub fn render_status(state: &TimerState) -> String {
        if state.current_task.is_empty() && state.elapsed_ms == 0 {
            return "State: idle".to_string();
        }

        let mut lines = vec![
            format!(
                "State: {}",
                if state.is_running { "running" } else { "stopped" }
            ),
            format!("Mode: {}", state.mode.label()),
            format!("Task: {}", state.current_task),
            format!("Elapsed: {}", Self::format_clock(state.elapsed_seconds())),
        ];
        if let Some(remaining) = state.remaining_seconds() {
            lines.push(format!("Remaining: {}", Self::format_clock(remaining)));
        }
        lines.join("\n")
    }

    /// Renders the single live line used by `watch`.
    pub fn render_timer_line(state: &TimerState) -> String {
        let clock = Self::format_clock(state.display_seconds());
        let task = if state.current_task.is_empty() {
            "-"
        } else {
            state.current_task.as_str()
        };
        let marker = if state.is_running { ">" } else { "||" };

        format!("{} {} [{}] {}", marker, clock, state.mode.label(), task)
    }

    /// Renders the history list with 1-based positions.
    pub fn render_history(entries: &[SessionEntry]) -> String {
        if entries.is_empty() {
            return "No sessions recorded yet".to_string();
        }

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                format!(
                    "{:>2}. {} {}  {:>6}  {}",
                    i + 1,
                    entry.date_text,
                    entry.time_text,
                    entry.duration_text,
                    entry.task
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Formats seconds as `MM:SS`; minutes grow past two digits as needed.
    pub fn format_clock(total_seconds: u64) -> String {
        format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
    }
}

// ============================================================================
// Tests
// ============================================================================
