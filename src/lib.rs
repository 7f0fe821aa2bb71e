//! Time Tracker Library
//!
//! Core of a personal time tracker with manual count-up timers and
//! Pomodoro work/break countdowns. It includes:
//! - Timer engine whose state survives daemon restarts
//! - Session history with CSV export and a task catalog
//! - IPC server/client for daemon-CLI communication with live updates
//! - Optional webhook delivery of finished sessions
//! - Configuration, persistence and shared type definitions

pub mod cli;
pub mod config;
pub mod daemon;
pub mod history;
pub mod storage;
pub mod types;
pub mod webhook;

// Re-export commonly used types for convenience
pub use config::TrackerConfig;
pub use daemon::{Clock, ManualClock, SystemClock, TimerEngine, TimerEvent};
pub use history::{SessionStore, TaskCatalog};
pub use storage::Storage;
pub use types::{
    Completion, IpcRequest, IpcResponse, ResponseData, SessionEntry, StopResult, TimerMessage,
    TimerMode, TimerState,
};
pub use webhook::WebhookClient;
