//! IPC Client for communicating with the time tracker daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Typed wrappers for every daemon command
//! - Connection retry logic
//! - A line-oriented subscription for live updates

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::types::{
    IpcRequest, IpcResponse, ResponseData, SessionEntry, StopResult, TimerMessage, TimerState,
};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes (64KB)
const MAX_RESPONSE_SIZE: u64 = 65536;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
#[derive(Debug, Clone)]
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a client talking to the daemon at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Starts a manual count-up timer.
    pub async fn start(&self, task: &str) -> Result<TimerState> {
        let request = IpcRequest::StartTimer {
            task: task.to_string(),
        };
        state_from(self.request(&request).await?)
    }

    /// Starts a work countdown.
    pub async fn start_pomodoro(&self, task: &str, duration_sec: u64) -> Result<TimerState> {
        let request = IpcRequest::StartPomodoro {
            task: task.to_string(),
            duration_sec,
        };
        state_from(self.request(&request).await?)
    }

    /// Starts a break countdown.
    pub async fn start_break(&self, duration_sec: u64) -> Result<TimerState> {
        state_from(self.request(&IpcRequest::StartBreak { duration_sec }).await?)
    }

    /// Stops the timer and returns the final duration.
    pub async fn stop(&self) -> Result<StopResult> {
        let data = data_from(self.request(&IpcRequest::StopTimer).await?)?;
        Ok(StopResult {
            duration_sec: data.duration_sec.unwrap_or(0),
            task: data.task.unwrap_or_default(),
            already_reported: data.already_reported.unwrap_or(false),
        })
    }

    /// Resets the timer to idle.
    pub async fn reset(&self) -> Result<TimerState> {
        state_from(self.request(&IpcRequest::ResetTimer).await?)
    }

    /// Queries the current timer state.
    pub async fn status(&self) -> Result<TimerState> {
        state_from(self.request(&IpcRequest::GetTimerState).await?)
    }

    /// Records a finished session.
    pub async fn record_session(&self, task: &str, duration_sec: u64) -> Result<SessionEntry> {
        let request = IpcRequest::RecordSession {
            task: task.to_string(),
            duration_sec,
        };
        data_from(self.request(&request).await?)?
            .entry
            .context("Daemon response is missing the recorded session")
    }

    /// Lists session history, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionEntry>> {
        Ok(data_from(self.request(&IpcRequest::ListSessions).await?)?
            .sessions
            .unwrap_or_default())
    }

    /// Deletes the session at zero-based `index` and returns the remaining
    /// history together with the daemon's message.
    pub async fn delete_session(&self, index: usize) -> Result<(String, Vec<SessionEntry>)> {
        let response = self.request(&IpcRequest::DeleteSession { index }).await?;
        let message = response.message.clone();
        let sessions = data_from(response)?.sessions.unwrap_or_default();
        Ok((message, sessions))
    }

    /// Renders history as CSV; `None` when there is nothing to export.
    pub async fn export_csv(&self) -> Result<Option<String>> {
        let response = self.request(&IpcRequest::ExportCsv).await?;
        Ok(response.data.and_then(|data| data.csv))
    }

    /// Adds a task to the catalog and returns the daemon's message with the
    /// resulting catalog.
    pub async fn add_task(&self, name: &str) -> Result<(String, Vec<String>)> {
        let request = IpcRequest::AddTask {
            name: name.to_string(),
        };
        let response = self.request(&request).await?;
        let message = response.message.clone();
        let tasks = data_from(response)?.tasks.unwrap_or_default();
        Ok((message, tasks))
    }

    /// Lists the task catalog.
    pub async fn list_tasks(&self) -> Result<Vec<String>> {
        Ok(data_from(self.request(&IpcRequest::ListTasks).await?)?
            .tasks
            .unwrap_or_default())
    }

    /// Opens a live subscription to timer push messages.
    pub async fn subscribe(&self) -> Result<Subscription> {
        let mut stream = self.connect().await?;
        self.write_request(&mut stream, &IpcRequest::Subscribe)
            .await?;

        Ok(Subscription {
            lines: BufReader::new(stream).lines(),
        })
    }

    /// Sends a request, turning error responses into errors.
    async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let response = self.send_request_with_retry(request).await?;
        if !response.success {
            anyhow::bail!("{}", response.message);
        }
        Ok(response)
    }

    /// Sends a request to the daemon with retry logic.
    ///
    /// Only transport failures are retried; an error response from the
    /// daemon is returned as-is.
    async fn send_request_with_retry(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!("request failed (attempt {}/{}): {}", attempt, MAX_RETRIES, e);
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("request was never attempted")))
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = self.connect().await?;
        self.write_request(&mut stream, request).await?;

        let mut buffer = Vec::new();
        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            (&mut stream)
                .take(MAX_RESPONSE_SIZE)
                .read_to_end(&mut buffer),
        )
        .await
        .context("Timed out waiting for the daemon")?
        .context("Failed to receive response")?;

        if buffer.is_empty() {
            anyhow::bail!("The daemon closed the connection without responding");
        }

        let response: IpcResponse =
            serde_json::from_slice(&buffer).context("Failed to parse daemon response")?;

        Ok(response)
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timed out")?
            .with_context(|| {
                format!(
                    "Cannot reach the daemon at {}. Start it with 'time-tracker daemon'",
                    self.socket_path.display()
                )
            })
    }

    /// Writes `request` and shuts down the write half to end it.
    async fn write_request(&self, stream: &mut UnixStream, request: &IpcRequest) -> Result<()> {
        let request_json = serde_json::to_vec(request).context("Failed to serialize request")?;

        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.write_all(&request_json),
        )
        .await
        .context("Write timed out")?
        .context("Failed to send request")?;

        stream
            .shutdown()
            .await
            .context("Failed to finish request")?;

        Ok(())
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Live stream of push messages from the daemon.
pub struct Subscription {
    lines: Lines<BufReader<UnixStream>>,
}

impl Subscription {
    /// Waits for the next message; `None` once the daemon hangs up.
    pub async fn next_message(&mut self) -> Result<Option<TimerMessage>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .context("Failed to read from the daemon")?
            else {
                return Ok(None);
            };

            if line.trim().is_empty() {
                continue;
            }

            let message =
                serde_json::from_str(&line).context("Failed to parse push message")?;
            return Ok(Some(message));
        }
    }
}

fn data_from(response: IpcResponse) -> Result<ResponseData> {
    response.data.context("Daemon response is missing data")
}

fn state_from(response: IpcResponse) -> Result<TimerState> {
    data_from(response)?
        .state
        .context("Daemon response is missing the timer state")
}

// ============================================================================
// Tests
// ============================================================================
