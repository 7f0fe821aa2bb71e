//! IPC server for the time tracker daemon.
//!
//! One request per connection: the client writes a JSON request, shuts down
//! its write half and reads back one JSON response line. A `SUBSCRIBE`
//! request instead keeps the connection open and receives one JSON push
//! message per line until the client goes away.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, timeout, Duration, Instant, MissedTickBehavior};

use crate::history::{SessionStore, StoreError, TaskCatalog};
use crate::types::{IpcRequest, IpcResponse, ResponseData, TimerMessage, TimerState};

use super::timer::{TimerEngine, TimerError};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (4KB)
const MAX_REQUEST_SIZE: usize = 4096;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

/// Idle seconds before a subscriber is sent a blank keep-alive line
pub const KEEPALIVE_SECS: u64 = 5;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,

    /// Client closed the connection without sending anything
    #[error("Connection closed by client")]
    EmptyRequest,
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// A stale socket file at the path is removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Accepts connections forever, serving each on its own task.
    pub async fn serve(&self, handler: Arc<RequestHandler>) {
        loop {
            let stream = match self.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handler.serve_connection(stream).await {
                    tracing::debug!(error = %e, "connection ended with error");
                }
            });
        }
    }

    /// Reads one request, terminated by the client closing its write half.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, oversize input, or invalid JSON.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<IpcRequest> {
        let mut buffer = Vec::with_capacity(256);
        let limit = MAX_REQUEST_SIZE as u64 + 1;

        let read_result = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            (&mut *stream).take(limit).read_to_end(&mut buffer),
        )
        .await;

        match read_result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(IpcError::ReadError(e.to_string()).into()),
            Err(_) => return Err(IpcError::Timeout.into()),
        }

        if buffer.is_empty() {
            return Err(IpcError::EmptyRequest.into());
        }
        if buffer.len() > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge.into());
        }

        let request: IpcRequest = serde_json::from_slice(&buffer)
            .with_context(|| "Failed to deserialize IPC request")?;

        Ok(request)
    }

    /// Serializes and sends an IPC response line to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
        let mut json = serde_json::to_vec(response).context("Failed to serialize IPC response")?;
        json.push(b'\n');

        stream
            .write_all(&json)
            .await
            .context("Failed to write response")?;
        stream.flush().await.context("Failed to flush response")?;

        Ok(())
    }

    /// Writes push messages to the stream until the client disconnects.
    ///
    /// While no message arrives for [`KEEPALIVE_SECS`], a blank line is
    /// written instead; the write fails once the client is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be serialized.
    pub async fn stream_messages(
        stream: &mut UnixStream,
        mut messages: mpsc::Receiver<TimerMessage>,
    ) -> Result<()> {
        let period = Duration::from_secs(KEEPALIVE_SECS);
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let line = tokio::select! {
                message = messages.recv() => {
                    let Some(message) = message else { break };
                    keepalive.reset();
                    let mut line = serde_json::to_vec(&message)
                        .context("Failed to serialize push message")?;
                    line.push(b'\n');
                    line
                }
                _ = keepalive.tick() => b"\n".to_vec(),
            };

            if stream.write_all(&line).await.is_err() {
                break;
            }
        }

        tracing::debug!("subscriber disconnected");
        Ok(())
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Dispatches IPC requests to the timer engine and the history stores.
///
/// Each handler method takes at most one lock at a time.
pub struct RequestHandler {
    /// Shared timer engine
    engine: Arc<Mutex<TimerEngine>>,
    /// Session history
    sessions: Arc<Mutex<SessionStore>>,
    /// Task catalog
    tasks: Arc<Mutex<TaskCatalog>>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(
        engine: Arc<Mutex<TimerEngine>>,
        sessions: Arc<Mutex<SessionStore>>,
        tasks: Arc<Mutex<TaskCatalog>>,
    ) -> Self {
        Self {
            engine,
            sessions,
            tasks,
        }
    }

    /// Serves a single accepted connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is unreadable or the response
    /// cannot be written.
    pub async fn serve_connection(&self, mut stream: UnixStream) -> Result<()> {
        let request = match IpcServer::receive_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                let response = IpcResponse::error(format!("Invalid request: {e}"));
                // The client may already be gone.
                let _ = IpcServer::send_response(&mut stream, &response).await;
                return Err(e);
            }
        };

        tracing::debug!(?request, "request received");

        if request == IpcRequest::Subscribe {
            let messages = self.subscribe().await;
            return IpcServer::stream_messages(&mut stream, messages).await;
        }

        let response = self.handle(request).await;
        IpcServer::send_response(&mut stream, &response).await
    }

    /// Attaches a push listener primed with the current state.
    pub async fn subscribe(&self) -> mpsc::Receiver<TimerMessage> {
        self.engine.lock().await.subscribe()
    }

    /// Handles an IPC request and returns the appropriate response.
    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::StartTimer { task } => self.handle_start_timer(&task).await,
            IpcRequest::StartPomodoro { task, duration_sec } => {
                self.handle_start_pomodoro(&task, duration_sec).await
            }
            IpcRequest::StartBreak { duration_sec } => self.handle_start_break(duration_sec).await,
            IpcRequest::StopTimer => self.handle_stop().await,
            IpcRequest::ResetTimer => self.handle_reset().await,
            IpcRequest::GetTimerState => self.handle_get_state().await,
            IpcRequest::RecordSession { task, duration_sec } => {
                self.handle_record_session(&task, duration_sec).await
            }
            IpcRequest::ListSessions => self.handle_list_sessions().await,
            IpcRequest::DeleteSession { index } => self.handle_delete_session(index).await,
            IpcRequest::ExportCsv => self.handle_export_csv().await,
            IpcRequest::AddTask { name } => self.handle_add_task(&name).await,
            IpcRequest::ListTasks => self.handle_list_tasks().await,
            IpcRequest::Subscribe => {
                IpcResponse::error("SUBSCRIBE needs a dedicated streaming connection")
            }
        }
    }

    async fn handle_start_timer(&self, task: &str) -> IpcResponse {
        let result = self.engine.lock().await.start(task);
        started("Timer started", result)
    }

    async fn handle_start_pomodoro(&self, task: &str, duration_sec: u64) -> IpcResponse {
        let result = self.engine.lock().await.start_pomodoro(task, duration_sec);
        started("Pomodoro started", result)
    }

    async fn handle_start_break(&self, duration_sec: u64) -> IpcResponse {
        let result = self.engine.lock().await.start_break(duration_sec);
        started("Break started", result)
    }

    async fn handle_stop(&self) -> IpcResponse {
        let result = self.engine.lock().await.stop();
        IpcResponse::success("Timer stopped", Some(ResponseData::from_stop_result(result)))
    }

    async fn handle_reset(&self) -> IpcResponse {
        let mut engine = self.engine.lock().await;
        engine.reset();
        IpcResponse::success(
            "Timer reset",
            Some(ResponseData::from_timer_state(engine.snapshot())),
        )
    }

    async fn handle_get_state(&self) -> IpcResponse {
        let state = self.engine.lock().await.snapshot();
        IpcResponse::success("", Some(ResponseData::from_timer_state(state)))
    }

    async fn handle_record_session(&self, task: &str, duration_sec: u64) -> IpcResponse {
        let task = task.trim();
        if task.is_empty() {
            return IpcResponse::error("task name must not be empty");
        }

        let entry = self
            .sessions
            .lock()
            .await
            .append(task, duration_sec / 60, duration_sec % 60);
        IpcResponse::success("Session recorded", Some(ResponseData::from_entry(entry)))
    }

    async fn handle_list_sessions(&self) -> IpcResponse {
        let sessions = self.sessions.lock().await.list().to_vec();
        IpcResponse::success("", Some(ResponseData::from_sessions(sessions)))
    }

    async fn handle_delete_session(&self, index: usize) -> IpcResponse {
        let mut sessions = self.sessions.lock().await;
        let message = match sessions.delete_at(index) {
            Some(_) => "Session deleted",
            None => "No session at that position",
        };
        IpcResponse::success(
            message,
            Some(ResponseData::from_sessions(sessions.list().to_vec())),
        )
    }

    async fn handle_export_csv(&self) -> IpcResponse {
        match self.sessions.lock().await.to_csv() {
            Ok(csv) => IpcResponse::success("", Some(ResponseData::from_csv(csv))),
            // Nothing to export is a notice, not a failure.
            Err(e @ StoreError::EmptyExport) => IpcResponse::success(e.to_string(), None),
        }
    }

    async fn handle_add_task(&self, name: &str) -> IpcResponse {
        if name.trim().is_empty() {
            return IpcResponse::error("task name must not be empty");
        }

        let mut tasks = self.tasks.lock().await;
        let message = if tasks.add(name) {
            "Task added"
        } else {
            "Task already exists"
        };
        IpcResponse::success(message, Some(ResponseData::from_tasks(tasks.list().to_vec())))
    }

    async fn handle_list_tasks(&self) -> IpcResponse {
        let tasks = self.tasks.lock().await.list().to_vec();
        IpcResponse::success("", Some(ResponseData::from_tasks(tasks)))
    }
}

fn started(message: &str, result: Result<TimerState, TimerError>) -> IpcResponse {
    match result {
        Ok(state) => IpcResponse::success(message, Some(ResponseData::from_timer_state(state))),
        Err(e) => IpcResponse::error(e.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
