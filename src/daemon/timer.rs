//! Timer engine for the time tracker.
//!
//! This module provides the core timer functionality:
//! - Manual count-up runs, work (Pomodoro) and break countdowns
//! - Elapsed time derived from wall-clock time, so a missed tick never
//!   loses time
//! - Countdown completion detection with distinct work/break notices
//! - Persistence of the canonical state after every mutation
//! - Rehydration of a persisted running timer on startup
//! - Snapshot publishing to attached listeners

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::storage::{Storage, TIMER_STATE_KEY};
use crate::types::{Completion, StopResult, TimerMessage, TimerMode, TimerState};

use super::broadcast::Broadcaster;
use super::clock::Clock;

/// Task name recorded for break countdowns.
pub const BREAK_TASK_NAME: &str = "Break";

/// Tick cadence of the run loop.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// TimerEvent
// ============================================================================

/// Lifecycle events for logging and external integrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A run started
    Started {
        /// Mode of the new run
        mode: TimerMode,
        /// Task being timed
        task: String,
        /// Countdown target in seconds (0 for manual)
        target_duration_sec: u64,
    },
    /// A persisted running timer was picked up again after a restart
    Resumed {
        /// Task being timed
        task: String,
        /// Elapsed time carried over from the persisted state
        elapsed_ms: u64,
    },
    /// The timer was stopped by a command
    Stopped {
        /// Task that was being timed
        task: String,
        /// Final duration in whole seconds
        duration_sec: u64,
    },
    /// The timer was cleared to idle
    Reset,
    /// A countdown reached its target
    Completed(Completion),
}

// ============================================================================
// TimerError
// ============================================================================

/// Errors returned by engine commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// A command argument was rejected
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Owner of the canonical timer state.
///
/// Share it as `Arc<Mutex<TimerEngine>>`: commands and ticks both go through
/// the lock, so they never observe each other half-applied.
pub struct TimerEngine {
    /// Canonical timer state
    state: TimerState,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Persistence backend
    storage: Arc<Storage>,
    /// Lifecycle event channel
    event_tx: mpsc::UnboundedSender<TimerEvent>,
    /// Attached snapshot listeners
    broadcaster: Broadcaster,
}

impl TimerEngine {
    /// Creates an engine, loading and rehydrating any persisted state.
    pub fn new(
        clock: Arc<dyn Clock>,
        storage: Arc<Storage>,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let state = match storage.get::<TimerState>(TIMER_STATE_KEY) {
            Ok(Some(state)) => state,
            Ok(None) => TimerState::new(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable persisted timer state");
                TimerState::new()
            }
        };

        let mut engine = Self {
            state,
            clock,
            storage,
            event_tx,
            broadcaster: Broadcaster::new(),
        };
        engine.rehydrate();
        engine
    }

    /// Re-anchors a running timer to the current wall-clock time.
    ///
    /// The stored elapsed time is kept and counting resumes from it, so time
    /// during which no engine was alive is not added to the run.
    pub fn rehydrate(&mut self) {
        if !self.state.is_running {
            return;
        }

        let now = self.clock.now_ms();
        self.state.start_time_epoch_ms = Some(now.saturating_sub(ms_to_i64(self.state.elapsed_ms)));

        tracing::debug!(
            task = %self.state.current_task,
            elapsed_ms = self.state.elapsed_ms,
            "resumed running timer"
        );
        self.emit(TimerEvent::Resumed {
            task: self.state.current_task.clone(),
            elapsed_ms: self.state.elapsed_ms,
        });
        self.persist();
    }

    /// Starts an open-ended count-up run for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidArgument`] if `task` is blank.
    pub fn start(&mut self, task: &str) -> Result<TimerState, TimerError> {
        let task = validate_task(task)?;
        Ok(self.begin(TimerMode::Manual, task, 0))
    }

    /// Starts a work countdown of `duration_sec` seconds for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidArgument`] if `task` is blank or the
    /// duration is zero.
    pub fn start_pomodoro(
        &mut self,
        task: &str,
        duration_sec: u64,
    ) -> Result<TimerState, TimerError> {
        let task = validate_task(task)?;
        let duration_sec = validate_duration(duration_sec)?;
        Ok(self.begin(TimerMode::Work, task, duration_sec))
    }

    /// Starts a break countdown of `duration_sec` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidArgument`] if the duration is zero.
    pub fn start_break(&mut self, duration_sec: u64) -> Result<TimerState, TimerError> {
        let duration_sec = validate_duration(duration_sec)?;
        Ok(self.begin(TimerMode::Break, BREAK_TASK_NAME.to_string(), duration_sec))
    }

    /// Stops the timer and reports the final duration.
    ///
    /// History entries are not created here; the caller hands the result
    /// to the session store. Only the first stop of a run is recordable,
    /// including one that follows an automatic countdown completion.
    pub fn stop(&mut self) -> StopResult {
        if self.state.is_running {
            self.refresh_elapsed();
        }
        self.state.is_running = false;

        let result = StopResult {
            duration_sec: self.state.elapsed_seconds(),
            task: self.state.current_task.clone(),
            already_reported: self.state.reported,
        };
        self.state.reported = true;

        tracing::debug!(task = %result.task, duration_sec = result.duration_sec, "timer stopped");
        self.persist();
        self.emit(TimerEvent::Stopped {
            task: result.task.clone(),
            duration_sec: result.duration_sec,
        });
        self.publish_state();

        result
    }

    /// Clears the run back to idle.
    ///
    /// `mode` and `target_duration_sec` keep their previous values.
    pub fn reset(&mut self) {
        self.state.is_running = false;
        self.state.elapsed_ms = 0;
        self.state.start_time_epoch_ms = None;
        self.state.current_task.clear();
        self.state.reported = false;

        tracing::debug!("timer reset");
        self.persist();
        self.emit(TimerEvent::Reset);
        self.publish_state();
    }

    /// Advances the running timer to the current wall-clock time.
    ///
    /// Returns true if a countdown completed on this tick.
    pub fn tick(&mut self) -> bool {
        if !self.state.is_running {
            return false;
        }

        self.refresh_elapsed();

        let completed = self.state.has_target() && self.state.elapsed_ms >= self.state.target_ms();
        if completed {
            self.state.is_running = false;
            self.handle_timer_complete();
        }

        self.persist();
        self.publish_state();

        completed
    }

    /// Returns a reference to the canonical state.
    pub fn get_state(&self) -> &TimerState {
        &self.state
    }

    /// Returns an owned copy of the canonical state.
    pub fn snapshot(&self) -> TimerState {
        self.state.clone()
    }

    /// Attaches a listener; it receives the current state first.
    pub fn subscribe(&mut self) -> mpsc::Receiver<TimerMessage> {
        self.broadcaster
            .subscribe_with(TimerMessage::TimerUpdate(self.state.clone()))
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.broadcaster.listener_count()
    }

    fn begin(&mut self, mode: TimerMode, task: String, target_duration_sec: u64) -> TimerState {
        if self.state.is_running {
            tracing::debug!(previous = %self.state.current_task, "replacing running timer");
        }

        self.state.is_running = true;
        self.state.start_time_epoch_ms = Some(self.clock.now_ms());
        self.state.elapsed_ms = 0;
        self.state.current_task = task;
        self.state.reported = false;
        self.state.mode = mode;
        self.state.target_duration_sec = target_duration_sec;

        tracing::debug!(
            mode = mode.as_str(),
            task = %self.state.current_task,
            target_duration_sec,
            "timer started"
        );
        self.persist();
        self.emit(TimerEvent::Started {
            mode,
            task: self.state.current_task.clone(),
            target_duration_sec,
        });
        self.publish_state();

        self.state.clone()
    }

    /// Recomputes elapsed time from the run's anchor.
    fn refresh_elapsed(&mut self) {
        let Some(start) = self.state.start_time_epoch_ms else {
            return;
        };

        let measured = u64::try_from(self.clock.now_ms().saturating_sub(start)).unwrap_or(0);
        // Never decreases, even if the wall clock steps backwards.
        let mut elapsed = measured.max(self.state.elapsed_ms);
        if self.state.has_target() {
            elapsed = elapsed.min(self.state.target_ms());
        }
        self.state.elapsed_ms = elapsed;
    }

    fn handle_timer_complete(&mut self) {
        let mode = self.state.mode;
        let completion = Completion {
            mode,
            task: self.state.current_task.clone(),
            message: mode.completion_message().unwrap_or_default().to_string(),
        };

        tracing::debug!(mode = mode.as_str(), task = %completion.task, "countdown complete");
        self.broadcaster
            .publish(&TimerMessage::TimerComplete(completion.clone()));
        self.emit(TimerEvent::Completed(completion));
    }

    fn persist(&self) {
        if let Err(e) = self.storage.set(TIMER_STATE_KEY, &self.state) {
            tracing::warn!(error = %e, "failed to persist timer state");
        }
    }

    fn publish_state(&mut self) {
        self.broadcaster
            .publish(&TimerMessage::TimerUpdate(self.state.clone()));
    }

    fn emit(&self, event: TimerEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("timer event receiver dropped");
        }
    }
}

/// Drives `engine` once per [`TICK_INTERVAL`], forever.
///
/// Spawn this as a separate tokio task.
pub async fn run_tick_loop(engine: Arc<Mutex<TimerEngine>>) {
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        engine.lock().await.tick();
    }
}

fn validate_task(task: &str) -> Result<String, TimerError> {
    let task = task.trim();
    if task.is_empty() {
        return Err(TimerError::InvalidArgument(
            "task name must not be empty".to_string(),
        ));
    }
    Ok(task.to_string())
}

fn validate_duration(duration_sec: u64) -> Result<u64, TimerError> {
    if duration_sec == 0 {
        return Err(TimerError::InvalidArgument(
            "duration must be greater than zero".to_string(),
        ));
    }
    Ok(duration_sec)
}

fn ms_to_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
