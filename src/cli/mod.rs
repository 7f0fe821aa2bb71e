//! CLI module for the time tracker.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic

pub mod client;
pub mod commands;
pub mod display;

pub use client::{IpcClient, Subscription};
pub use commands::{Cli, Commands, TaskCommands};
pub use display::Display;
