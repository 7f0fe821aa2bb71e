//! Integration tests for daemon-CLI IPC communication.
//!
//! A real `IpcServer` serves a `RequestHandler` over a temporary socket and
//! the CLI's `IpcClient` talks to it:
//! - TC-I-001: Manual timer start, status and stop with history recording
//! - TC-I-002: Pomodoro completion pushed to a subscriber
//! - TC-I-003: History listing, deletion and CSV export
//! - TC-I-004: Task catalog
//! - TC-I-005: Connection and validation error handling
//! - TC-I-006: Concurrent clients

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use time_tracker::cli::client::IpcClient;
use time_tracker::daemon::clock::{Clock, ManualClock};
use time_tracker::daemon::ipc::{IpcServer, RequestHandler};
use time_tracker::daemon::timer::{TimerEngine, TimerEvent};
use time_tracker::history::{SessionStore, TaskCatalog, CSV_HEADER, MAX_ENTRIES};
use time_tracker::storage::Storage;
use time_tracker::types::{TimerMessage, TimerMode};

/// 2024-03-01T12:00:00Z
const T0: i64 = 1_709_294_400_000;

// ============================================================================
// Test Helpers
// ============================================================================

/// Creates a temporary socket path for testing.
fn create_temp_socket_path() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integration_test.sock");
    // Keep the directory so it's not deleted
    std::mem::forget(dir);
    path
}

/// A daemon wired to a manual clock and an in-memory store.
struct TestDaemon {
    client: IpcClient,
    engine: Arc<Mutex<TimerEngine>>,
    clock: ManualClock,
    _events: mpsc::UnboundedReceiver<TimerEvent>,
    server: JoinHandle<()>,
}

impl TestDaemon {
    fn spawn() -> Self {
        let socket_path = create_temp_socket_path();
        let storage = Arc::new(Storage::in_memory());
        let clock = ManualClock::new(T0);
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        let engine = Arc::new(Mutex::new(TimerEngine::new(
            Arc::clone(&shared_clock),
            Arc::clone(&storage),
            tx,
        )));
        let sessions = Arc::new(Mutex::new(SessionStore::load(
            Arc::clone(&storage),
            shared_clock,
        )));
        let tasks = Arc::new(Mutex::new(TaskCatalog::load(storage)));
        let handler = Arc::new(RequestHandler::new(Arc::clone(&engine), sessions, tasks));

        let server = IpcServer::new(&socket_path).unwrap();
        let server = tokio::spawn(async move { server.serve(handler).await });

        Self {
            client: IpcClient::new(socket_path),
            engine,
            clock,
            _events: rx,
            server,
        }
    }

    /// Advances the clock and runs one engine tick.
    async fn advance_and_tick(&self, secs: i64) -> bool {
        self.clock.advance_secs(secs);
        self.engine.lock().await.tick()
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// ============================================================================
// TC-I-001: Manual timer via IPC
// ============================================================================

/// TC-I-001: start, tick, status, stop, record
#[tokio::test]
async fn tc_i_001_manual_timer_flow() {
    let daemon = TestDaemon::spawn();

    let state = daemon.client.start("Write report").await.unwrap();
    assert!(state.is_running);
    assert_eq!(state.mode, TimerMode::Manual);
    assert_eq!(state.current_task, "Write report");
    assert_eq!(state.target_duration_sec, 0);

    assert!(!daemon.advance_and_tick(65).await);

    let state = daemon.client.status().await.unwrap();
    assert!(state.is_running);
    assert_eq!(state.elapsed_seconds(), 65);

    daemon.clock.advance_secs(30);
    let stopped = daemon.client.stop().await.unwrap();
    assert_eq!(stopped.duration_sec, 95);
    assert_eq!(stopped.task, "Write report");
    assert!(stopped.is_recordable());

    let entry = daemon
        .client
        .record_session(&stopped.task, stopped.duration_sec)
        .await
        .unwrap();
    assert_eq!(entry.task, "Write report");
    assert_eq!(entry.duration_text, "1:35");
    assert_eq!(entry.timestamp_iso, "2024-03-01T12:01:35.000Z");

    // Stop keeps the task and elapsed time until a reset.
    let state = daemon.client.status().await.unwrap();
    assert!(!state.is_running);
    assert_eq!(state.current_task, "Write report");
    assert_eq!(state.elapsed_seconds(), 95);

    let state = daemon.client.reset().await.unwrap();
    assert_eq!(state.elapsed_ms, 0);
    assert_eq!(state.current_task, "");
}

/// TC-I-001b: starting while running replaces the run
#[tokio::test]
async fn tc_i_001b_restart_replaces_run() {
    let daemon = TestDaemon::spawn();

    daemon.client.start("First").await.unwrap();
    daemon.advance_and_tick(10).await;

    let state = daemon.client.start("Second").await.unwrap();
    assert!(state.is_running);
    assert_eq!(state.current_task, "Second");
    assert_eq!(state.elapsed_ms, 0);
}

// ============================================================================
// TC-I-002: Pomodoro completion pushed to subscribers
// ============================================================================

/// TC-I-002: a subscriber sees the current state, updates and completion
#[tokio::test]
async fn tc_i_002_pomodoro_completion_is_pushed() {
    let daemon = TestDaemon::spawn();
    let mut subscription = daemon.client.subscribe().await.unwrap();

    let first = timeout(Duration::from_secs(2), subscription.next_message())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, Some(TimerMessage::TimerUpdate(ref s)) if !s.is_running));

    daemon.client.start_pomodoro("Write", 120).await.unwrap();
    assert!(!daemon.advance_and_tick(60).await);
    assert!(daemon.advance_and_tick(61).await);

    let mut updates = Vec::new();
    let completion = loop {
        let message = timeout(Duration::from_secs(2), subscription.next_message())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match message {
            TimerMessage::TimerUpdate(state) => updates.push(state),
            TimerMessage::TimerComplete(completion) => break completion,
        }
    };

    assert_eq!(completion.mode, TimerMode::Work);
    assert_eq!(completion.task, "Write");
    assert_eq!(completion.message, "Pomodoro complete! Time for a break.");
    // Start snapshot plus the first tick.
    assert!(updates.iter().any(|s| s.is_running && s.elapsed_seconds() == 60));

    // Completion is followed by a final snapshot clamped to the target.
    let last = timeout(Duration::from_secs(2), subscription.next_message())
        .await
        .unwrap()
        .unwrap();
    match last {
        Some(TimerMessage::TimerUpdate(state)) => {
            assert!(!state.is_running);
            assert_eq!(state.elapsed_ms, 120_000);
            assert_eq!(state.remaining_seconds(), Some(0));
        }
        other => panic!("Expected final update, got {:?}", other),
    }

    let state = daemon.client.status().await.unwrap();
    assert!(!state.is_running);
    assert_eq!(state.pomodoro_count, 0);
}

/// TC-I-002b: a break completes with its own message
#[tokio::test]
async fn tc_i_002b_break_completion() {
    let daemon = TestDaemon::spawn();

    let state = daemon.client.start_break(300).await.unwrap();
    assert_eq!(state.mode, TimerMode::Break);
    assert_eq!(state.current_task, "Break");

    let mut subscription = daemon.client.subscribe().await.unwrap();
    // The listener is attached once the current state arrives.
    let first = timeout(Duration::from_secs(2), subscription.next_message())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, Some(TimerMessage::TimerUpdate(ref s)) if s.is_running));

    assert!(daemon.advance_and_tick(300).await);

    let completion = loop {
        let message = timeout(Duration::from_secs(2), subscription.next_message())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let TimerMessage::TimerComplete(completion) = message {
            break completion;
        }
    };
    assert_eq!(completion.message, "Break is over. Ready to focus?");
}

// ============================================================================
// TC-I-003: History via IPC
// ============================================================================

/// TC-I-003: newest first, capped, deletable, exportable
#[tokio::test]
async fn tc_i_003_history_flow() {
    let daemon = TestDaemon::spawn();

    assert!(daemon.client.list_sessions().await.unwrap().is_empty());
    assert_eq!(daemon.client.export_csv().await.unwrap(), None);

    for i in 0..(MAX_ENTRIES + 2) {
        daemon.clock.advance_secs(60);
        daemon
            .client
            .record_session(&format!("Task {i}"), 60 + i as u64)
            .await
            .unwrap();
    }

    let sessions = daemon.client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), MAX_ENTRIES);
    assert_eq!(sessions[0].task, format!("Task {}", MAX_ENTRIES + 1));
    assert_eq!(sessions[MAX_ENTRIES - 1].task, "Task 2");
    assert!(sessions.windows(2).all(|w| w[0].id > w[1].id));

    let (message, sessions) = daemon.client.delete_session(0).await.unwrap();
    assert_eq!(message, "Session deleted");
    assert_eq!(sessions.len(), MAX_ENTRIES - 1);
    assert_eq!(sessions[0].task, format!("Task {}", MAX_ENTRIES));

    // Out of range is a silent no-op.
    let (_, sessions) = daemon.client.delete_session(99).await.unwrap();
    assert_eq!(sessions.len(), MAX_ENTRIES - 1);

    let csv = daemon.client.export_csv().await.unwrap().unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), MAX_ENTRIES);
    assert!(!csv.ends_with('\n'));
    assert!(lines[1].contains(&format!(",Task {},", MAX_ENTRIES)));
}

// ============================================================================
// TC-I-004: Task catalog via IPC
// ============================================================================

/// TC-I-004: tasks are trimmed and deduplicated
#[tokio::test]
async fn tc_i_004_task_catalog() {
    let daemon = TestDaemon::spawn();

    assert!(daemon.client.list_tasks().await.unwrap().is_empty());

    let (message, tasks) = daemon.client.add_task("  Review ").await.unwrap();
    assert_eq!(message, "Task added");
    assert_eq!(tasks, vec!["Review".to_string()]);

    let (message, tasks) = daemon.client.add_task("Review").await.unwrap();
    assert_eq!(message, "Task already exists");
    assert_eq!(tasks.len(), 1);

    daemon.client.add_task("Write").await.unwrap();
    assert_eq!(
        daemon.client.list_tasks().await.unwrap(),
        vec!["Review".to_string(), "Write".to_string()]
    );
}

// ============================================================================
// TC-I-005: Error handling
// ============================================================================

/// TC-I-005: no daemon listening
#[tokio::test]
async fn tc_i_005_connection_error() {
    let client = IpcClient::new(create_temp_socket_path());

    let result = client.status().await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("Cannot reach the daemon"));
}

/// TC-I-005b: validation errors come back as errors and change nothing
#[tokio::test]
async fn tc_i_005b_validation_errors() {
    let daemon = TestDaemon::spawn();

    let err = daemon.client.start("   ").await.unwrap_err();
    assert!(err.to_string().contains("must not be empty"));

    let err = daemon.client.start_pomodoro("Write", 0).await.unwrap_err();
    assert!(err.to_string().contains("greater than zero"));

    let state = daemon.client.status().await.unwrap();
    assert!(!state.is_running);
    assert_eq!(state.current_task, "");
}

/// TC-I-005c: stopping an idle timer is harmless and not recordable
#[tokio::test]
async fn tc_i_005c_stop_when_idle() {
    let daemon = TestDaemon::spawn();

    let stopped = daemon.client.stop().await.unwrap();

    assert_eq!(stopped.duration_sec, 0);
    assert!(!stopped.is_recordable());
}

// ============================================================================
// TC-I-006: Concurrent clients
// ============================================================================

/// TC-I-006: many clients at once all get answers
#[tokio::test]
async fn tc_i_006_concurrent_clients() {
    let daemon = TestDaemon::spawn();
    daemon.client.start("Write").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = daemon.client.clone();
        handles.push(tokio::spawn(async move { client.status().await }));
    }

    for handle in handles {
        let state = handle.await.unwrap().unwrap();
        assert!(state.is_running);
        assert_eq!(state.current_task, "Write");
    }
}
