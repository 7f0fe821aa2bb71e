//! History and task bookkeeping.
//!
//! - `session`: bounded log of completed sessions with CSV export
//! - `tasks`: catalog of task names offered for new runs

pub mod session;
pub mod tasks;

pub use session::{SessionStore, CSV_HEADER, MAX_ENTRIES};
pub use tasks::TaskCatalog;

/// History error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// CSV export was requested with no sessions recorded
    #[error("No sessions to export")]
    EmptyExport,
}
