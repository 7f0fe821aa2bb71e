//! Command definitions for the time tracker CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Maximum task name length accepted on the command line.
const MAX_TASK_NAME_LEN: usize = 100;

// ============================================================================
// CLI Structure
// ============================================================================

/// Time tracker CLI
#[derive(Parser, Debug)]
#[command(
    name = "time-tracker",
    version,
    about = "Personal time tracker with manual and Pomodoro timers",
    long_about = "Track time against tasks with a count-up timer or Pomodoro countdowns.\n\
                  A background daemon keeps the timer running between commands.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to an alternative config file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a count-up timer for a task
    Start(StartArgs),

    /// Start a Pomodoro work countdown
    Pomodoro(PomodoroArgs),

    /// Start a break countdown
    Break(BreakArgs),

    /// Stop the timer and record the session
    Stop(StopArgs),

    /// Clear the timer without recording anything
    Reset,

    /// Show current timer status
    Status,

    /// Follow the timer live until interrupted
    Watch,

    /// List recent sessions, newest first
    History,

    /// Delete a session from history
    Delete {
        /// Position as shown by `history` (1 = newest)
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        position: u64,
    },

    /// Export session history as CSV
    Export(ExportArgs),

    /// Manage the task list
    Task {
        /// Task action
        #[command(subcommand)]
        action: TaskCommands,
    },

    /// Run as daemon (background service)
    #[command(hide = true)]
    Daemon,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Task catalog actions
#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommands {
    /// Add a task name
    Add {
        /// Task name
        #[arg(value_parser = validate_task_name)]
        name: String,
    },

    /// List task names
    List,
}

// ============================================================================
// Command Arguments
// ============================================================================

/// Arguments for the start command
#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Task name
    #[arg(value_parser = validate_task_name)]
    pub task: String,
}

/// Arguments for the pomodoro command
#[derive(Args, Debug, Clone)]
pub struct PomodoroArgs {
    /// Task name
    #[arg(value_parser = validate_task_name)]
    pub task: String,

    /// Work duration in minutes (1-120); defaults to the configured value
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(1..=120)
    )]
    pub minutes: Option<u32>,
}

/// Arguments for the break command
#[derive(Args, Debug, Clone, Default)]
pub struct BreakArgs {
    /// Break duration in minutes (1-60); defaults to the configured value
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(1..=60)
    )]
    pub minutes: Option<u32>,

    /// Use the long break duration
    #[arg(short, long, conflicts_with = "minutes")]
    pub long: bool,
}

/// Arguments for the stop command
#[derive(Args, Debug, Clone, Default)]
pub struct StopArgs {
    /// Do not post the session to the configured webhook
    #[arg(long)]
    pub no_webhook: bool,
}

/// Arguments for the export command
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Output file; defaults to `time-tracker-<date>.csv`
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates the task name.
///
/// - Must not be blank
/// - Must not exceed 100 characters
fn validate_task_name(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("task name must not be empty".to_string());
    }
    if trimmed.chars().count() > MAX_TASK_NAME_LEN {
        return Err(format!(
            "task name must be at most {MAX_TASK_NAME_LEN} characters"
        ));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Tests
// ============================================================================
