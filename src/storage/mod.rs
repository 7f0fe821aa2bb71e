//! Key-value persistence for the time tracker.
//!
//! All persisted data lives in one JSON document with the keys
//! [`TIMER_STATE_KEY`], [`TASKS_KEY`] and [`TIME_ENTRIES_KEY`]. The document
//! is cached in memory; `set` updates the cache and queues the whole
//! document for a background writer thread, so callers never wait on the
//! disk. The writer only keeps the newest queued document and replaces the
//! file atomically. [`Storage::flush`] waits for queued writes, and dropping
//! the store drains the queue before returning.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Key holding the canonical timer state.
pub const TIMER_STATE_KEY: &str = "timerState";

/// Key holding the task catalog.
pub const TASKS_KEY: &str = "tasks";

/// Key holding the history log.
pub const TIME_ENTRIES_KEY: &str = "timeEntries";

/// Write attempts before a flush is reported as failed.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The data file exists but could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Data file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The data file is not a JSON object
    #[error("Data file {path} is corrupt: {reason}")]
    Corrupt {
        /// Data file path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// The data file could not be written
    #[error("Failed to write {path} after {attempts} attempts: {source}")]
    Write {
        /// Data file path
        path: PathBuf,
        /// Number of attempts made
        attempts: u32,
        /// Last I/O error
        #[source]
        source: std::io::Error,
    },

    /// The most recent background write failed
    #[error("Data file {path} is not up to date: {reason}")]
    Unflushed {
        /// Data file path
        path: PathBuf,
        /// Message of the failed write
        reason: String,
    },

    /// The writer thread could not be started or has gone away
    #[error("Storage writer unavailable: {0}")]
    Writer(String),

    /// A value could not be converted to or from JSON
    #[error("Failed to (de)serialize '{key}': {source}")]
    Serde {
        /// Storage key
        key: String,
        /// serde_json error
        #[source]
        source: serde_json::Error,
    },
}

/// Work queued for the writer thread.
enum WriteCommand {
    /// Replace the file with this document
    Write(Vec<u8>),
    /// Answer once everything queued before has been written; carries the
    /// error message of the last write, if it failed
    Flush(Sender<Option<String>>),
}

/// Handle on the background writer thread.
#[derive(Debug)]
struct Writer {
    commands: Option<Sender<WriteCommand>>,
    thread: Option<JoinHandle<()>>,
}

/// JSON-document key-value store.
#[derive(Debug)]
pub struct Storage {
    /// Backing file; `None` keeps everything in memory
    path: Option<PathBuf>,
    /// Cached document
    data: Mutex<Map<String, Value>>,
    /// Writer for the backing file
    writer: Option<Writer>,
}

impl Storage {
    /// Opens the store at `path` and starts its writer thread.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let data = Self::load_document(&path)?;
        tracing::debug!(path = %path.display(), keys = data.len(), "opened storage");

        let (commands, queue) = crossbeam_channel::unbounded();
        let writer_path = path.clone();
        let thread = std::thread::Builder::new()
            .name("storage-writer".to_string())
            .spawn(move || run_writer(&writer_path, &queue))
            .map_err(|e| StorageError::Writer(e.to_string()))?;

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
            writer: Some(Writer {
                commands: Some(commands),
                thread: Some(thread),
            }),
        })
    }

    /// Creates a store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(Map::new()),
            writer: None,
        }
    }

    /// Returns the backing file path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reads and deserializes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value has the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);

        match data.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| StorageError::Serde {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key` and queues the document for writing.
    ///
    /// Returns as soon as the cache is updated; write failures are logged by
    /// the writer and surface through [`Storage::flush`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the writer has stopped.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|source| StorageError::Serde {
            key: key.to_string(),
            source,
        })?;

        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), value);

        let Some(commands) = self.commands() else {
            return Ok(());
        };

        // Queued under the cache lock so documents reach the writer in order.
        let bytes = serde_json::to_vec_pretty(&*data).map_err(|source| StorageError::Serde {
            key: "*".to_string(),
            source,
        })?;
        commands
            .send(WriteCommand::Write(bytes))
            .map_err(|e| StorageError::Writer(e.to_string()))
    }

    /// Blocks until every queued write has reached the disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the most recent write failed.
    pub fn flush(&self) -> Result<(), StorageError> {
        let (Some(commands), Some(path)) = (self.commands(), &self.path) else {
            return Ok(());
        };

        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        commands
            .send(WriteCommand::Flush(ack_tx))
            .map_err(|e| StorageError::Writer(e.to_string()))?;

        match ack_rx.recv() {
            Ok(None) => Ok(()),
            Ok(Some(reason)) => Err(StorageError::Unflushed {
                path: path.clone(),
                reason,
            }),
            Err(e) => Err(StorageError::Writer(e.to_string())),
        }
    }

    fn commands(&self) -> Option<&Sender<WriteCommand>> {
        self.writer.as_ref().and_then(|w| w.commands.as_ref())
    }

    fn load_document(path: &Path) -> Result<Map<String, Value>, StorageError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: "top-level value is not an object".to_string(),
            }),
            Err(e) => Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            // Closing the queue lets the writer drain it and exit.
            writer.commands.take();
            if let Some(thread) = writer.thread.take() {
                if thread.join().is_err() {
                    tracing::warn!("storage writer panicked");
                }
            }
        }
    }
}

/// Writer thread body: writes the newest queued document, answers flushes.
fn run_writer(path: &Path, queue: &Receiver<WriteCommand>) {
    let mut last_error: Option<String> = None;

    while let Ok(command) = queue.recv() {
        let mut pending = None;
        let mut acks = Vec::new();

        for command in std::iter::once(command).chain(queue.try_iter()) {
            match command {
                WriteCommand::Write(bytes) => pending = Some(bytes),
                WriteCommand::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(bytes) = pending {
            last_error = match write_with_retry(path, &bytes) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to persist data file");
                    Some(e.to_string())
                }
            };
        }

        for ack in acks {
            let _ = ack.send(last_error.clone());
        }
    }

    tracing::debug!(path = %path.display(), "storage writer finished");
}

fn write_with_retry(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut attempt = 1;
    loop {
        match write_atomic(path, bytes) {
            Ok(()) => return Ok(()),
            Err(source) if attempt >= MAX_WRITE_ATTEMPTS => {
                return Err(StorageError::Write {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "storage write failed, retrying");
                attempt += 1;
            }
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

// ============================================================================
// Tests
// ============================================================================
