//! Daemon side of the time tracker.
//!
//! - `clock`: wall-clock abstraction
//! - `broadcast`: push channel fan-out
//! - `timer`: timer engine with state transitions and tick handling
//! - `ipc`: Unix socket server and request dispatch

pub mod broadcast;
pub mod clock;
pub mod ipc;
pub mod timer;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};

use crate::config::TrackerConfig;
use crate::history::{SessionStore, TaskCatalog};
use crate::storage::Storage;

pub use broadcast::Broadcaster;
pub use clock::{Clock, ManualClock, SystemClock};
pub use ipc::{IpcServer, RequestHandler};
pub use timer::{run_tick_loop, TimerEngine, TimerError, TimerEvent};

/// Runs the daemon until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the data file is unreadable or the socket cannot be
/// bound.
pub async fn run(config: &TrackerConfig) -> Result<()> {
    let data_path = config.data_path();
    let storage = Arc::new(
        Storage::open(&data_path)
            .with_context(|| format!("Failed to open data file: {:?}", data_path))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let engine = Arc::new(Mutex::new(TimerEngine::new(
        Arc::clone(&clock),
        Arc::clone(&storage),
        event_tx,
    )));
    let sessions = Arc::new(Mutex::new(SessionStore::load(Arc::clone(&storage), clock)));
    let tasks = Arc::new(Mutex::new(TaskCatalog::load(Arc::clone(&storage))));
    let handler = Arc::new(RequestHandler::new(Arc::clone(&engine), sessions, tasks));

    let server = IpcServer::new(&config.socket_path())?;
    tracing::info!(
        socket = %server.socket_path().display(),
        data = %data_path.display(),
        "daemon listening"
    );

    let ticker = tokio::spawn(run_tick_loop(engine));
    let events = tokio::spawn(log_events(event_rx));

    tokio::select! {
        _ = server.serve(handler) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("shutdown requested");
        }
    }

    ticker.abort();
    events.abort();

    let flushed = tokio::task::spawn_blocking(move || storage.flush())
        .await
        .context("Storage flush task failed")?;
    if let Err(e) = flushed {
        tracing::warn!(error = %e, "data file may be out of date");
    }
    Ok(())
}

/// Logs timer lifecycle events as they happen.
async fn log_events(mut events: mpsc::UnboundedReceiver<TimerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TimerEvent::Started {
                mode,
                task,
                target_duration_sec,
            } => tracing::info!(
                mode = mode.as_str(),
                %task,
                target_duration_sec,
                "timer started"
            ),
            TimerEvent::Resumed { task, elapsed_ms } => {
                tracing::info!(%task, elapsed_ms, "timer resumed after restart")
            }
            TimerEvent::Stopped { task, duration_sec } => {
                tracing::info!(%task, duration_sec, "timer stopped")
            }
            TimerEvent::Reset => tracing::info!("timer reset"),
            TimerEvent::Completed(completion) => tracing::info!(
                mode = completion.mode.as_str(),
                task = %completion.task,
                "{}",
                completion.message
            ),
        }
    }
}
