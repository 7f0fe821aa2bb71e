//! Restart tests: state written by one daemon is picked up by the next.
//!
//! Each "daemon" is a fresh `Storage` + engine/stores over the same data
//! file, driven by a shared `ManualClock` so downtime can be simulated.
//! - TC-R-001: A running timer resumes without counting downtime
//! - TC-R-002: A stopped timer stays stopped with its task and duration
//! - TC-R-003: History and tasks survive restarts
//! - TC-R-004: Unreadable data files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use time_tracker::daemon::clock::{Clock, ManualClock};
use time_tracker::daemon::timer::{TimerEngine, TimerEvent};
use time_tracker::history::{SessionStore, TaskCatalog};
use time_tracker::storage::{Storage, StorageError};
use time_tracker::types::{TimerMessage, TimerMode};

/// 2024-03-01T12:00:00Z
const T0: i64 = 1_709_294_400_000;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_data_path() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    (dir, path)
}

struct Boot {
    storage: Arc<Storage>,
    engine: TimerEngine,
    sessions: SessionStore,
    tasks: TaskCatalog,
    events: mpsc::UnboundedReceiver<TimerEvent>,
}

/// Simulates a daemon start over the data file at `path`.
fn boot(path: &Path, clock: &ManualClock) -> Boot {
    let storage = Arc::new(Storage::open(path).unwrap());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    Boot {
        engine: TimerEngine::new(Arc::clone(&shared_clock), Arc::clone(&storage), tx),
        sessions: SessionStore::load(Arc::clone(&storage), shared_clock),
        tasks: TaskCatalog::load(Arc::clone(&storage)),
        storage,
        events: rx,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TimerEvent>) -> Vec<TimerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// TC-R-001: Running timer resumes
// ============================================================================

/// TC-R-001: elapsed time is preserved and downtime is not counted
#[test]
fn tc_r_001_running_timer_resumes_without_downtime() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.engine.start("Deep work").unwrap();
        clock.advance_secs(90);
        first.engine.tick();
        assert_eq!(first.engine.get_state().elapsed_seconds(), 90);
    }

    // Ten minutes pass with no daemon.
    clock.advance_secs(600);

    let mut second = boot(&path, &clock);
    let state = second.engine.snapshot();
    assert!(state.is_running);
    assert_eq!(state.current_task, "Deep work");
    assert_eq!(state.elapsed_ms, 90_000);
    assert_eq!(state.start_time_epoch_ms, Some(clock.now_ms() - 90_000));

    let events = drain(&mut second.events);
    assert_eq!(
        events,
        vec![TimerEvent::Resumed {
            task: "Deep work".to_string(),
            elapsed_ms: 90_000,
        }]
    );

    clock.advance_secs(5);
    second.engine.tick();
    assert_eq!(second.engine.get_state().elapsed_seconds(), 95);

    let stopped = second.engine.stop();
    assert_eq!(stopped.duration_sec, 95);
}

/// TC-R-001b: a countdown resumes and still completes at its target
#[test]
fn tc_r_001b_countdown_resumes_and_completes() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.engine.start_pomodoro("Write", 300).unwrap();
        clock.advance_secs(200);
        first.engine.tick();
    }

    clock.advance_secs(3600);
    let mut second = boot(&path, &clock);
    let mut listener = second.engine.subscribe();
    assert_eq!(second.engine.get_state().remaining_seconds(), Some(100));

    clock.advance_secs(99);
    assert!(!second.engine.tick());
    clock.advance_secs(1);
    assert!(second.engine.tick());

    let mut completed = false;
    while let Ok(message) = listener.try_recv() {
        if let TimerMessage::TimerComplete(completion) = message {
            assert_eq!(completion.mode, TimerMode::Work);
            assert_eq!(completion.task, "Write");
            completed = true;
        }
    }
    assert!(completed);
}

/// TC-R-001c: the re-anchored start time is written back to disk
#[test]
fn tc_r_001c_rehydrated_anchor_is_persisted() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.engine.start("Write").unwrap();
        clock.advance_secs(30);
        first.engine.tick();
    }

    clock.advance_secs(120);
    let second = boot(&path, &clock);
    second.storage.flush().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        document["timerState"]["startTimeEpochMs"],
        clock.now_ms() - 30_000
    );
    assert_eq!(document["timerState"]["elapsedMs"], 30_000);
}

// ============================================================================
// TC-R-002: Stopped timer stays stopped
// ============================================================================

/// TC-R-002: stop is durable and does not resume
#[test]
fn tc_r_002_stopped_timer_stays_stopped() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.engine.start("Read").unwrap();
        clock.advance_secs(42);
        first.engine.stop();
    }

    clock.advance_secs(600);
    let mut second = boot(&path, &clock);

    let state = second.engine.snapshot();
    assert!(!state.is_running);
    assert_eq!(state.current_task, "Read");
    assert_eq!(state.elapsed_seconds(), 42);
    assert!(drain(&mut second.events).is_empty());
}

/// TC-R-002b: reset is durable too
#[test]
fn tc_r_002b_reset_is_durable() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.engine.start_break(300).unwrap();
        clock.advance_secs(10);
        first.engine.reset();
    }

    let second = boot(&path, &clock);
    let state = second.engine.snapshot();
    assert!(!state.is_running);
    assert_eq!(state.elapsed_ms, 0);
    assert_eq!(state.current_task, "");
    assert_eq!(state.mode, TimerMode::Break);
}

// ============================================================================
// TC-R-003: History and tasks survive restarts
// ============================================================================

/// TC-R-003: sessions and tasks are reloaded in order
#[test]
fn tc_r_003_history_and_tasks_survive() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.tasks.add("Write");
        first.tasks.add("Review");
        first.sessions.append("Write", 25, 0);
        clock.advance_secs(60);
        first.sessions.append("Review", 4, 7);
    }

    let mut second = boot(&path, &clock);
    assert_eq!(second.tasks.list(), ["Write", "Review"]);

    let tasks: Vec<&str> = second.sessions.list().iter().map(|e| e.task.as_str()).collect();
    assert_eq!(tasks, ["Review", "Write"]);
    assert_eq!(second.sessions.list()[0].duration_text, "4:07");

    // Ids keep increasing even if the clock has not moved.
    let previous = second.sessions.list()[0].id;
    let entry = second.sessions.append("Write", 1, 0);
    assert!(entry.id > previous);
}

/// TC-R-003b: the data file uses the documented keys
#[test]
fn tc_r_003b_data_file_layout() {
    let (_dir, path) = create_data_path();
    let clock = ManualClock::new(T0);

    {
        let mut first = boot(&path, &clock);
        first.engine.start("Write").unwrap();
        first.tasks.add("Write");
        first.sessions.append("Write", 1, 0);
    }

    let raw = std::fs::read_to_string(&path).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(document["timerState"]["isRunning"], true);
    assert_eq!(document["timerState"]["currentTask"], "Write");
    assert_eq!(document["timerState"]["mode"], "manual");
    assert_eq!(document["tasks"], serde_json::json!(["Write"]));
    assert_eq!(document["timeEntries"][0]["duration"], "1:00");
    assert_eq!(
        document["timeEntries"][0]["timestamp"],
        "2024-03-01T12:00:00.000Z"
    );
}

// ============================================================================
// TC-R-004: Unreadable data files
// ============================================================================

/// TC-R-004: a corrupt data file is reported rather than overwritten
#[test]
fn tc_r_004_corrupt_data_file() {
    let (_dir, path) = create_data_path();
    std::fs::write(&path, "{ not json").unwrap();

    let result = Storage::open(&path);

    assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

/// TC-R-004b: a malformed timer state falls back to idle
#[test]
fn tc_r_004b_malformed_timer_state_is_ignored() {
    let (_dir, path) = create_data_path();
    std::fs::write(
        &path,
        r#"{"timerState": {"isRunning": "yes"}, "tasks": ["Write"]}"#,
    )
    .unwrap();

    let clock = ManualClock::new(T0);
    let booted = boot(&path, &clock);

    assert!(!booted.engine.get_state().is_running);
    assert_eq!(booted.tasks.list(), ["Write"]);
}
