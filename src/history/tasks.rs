//! Catalog of task names.

use std::sync::Arc;

use crate::storage::{Storage, TASKS_KEY};

/// Distinct task names in insertion order.
pub struct TaskCatalog {
    tasks: Vec<String>,
    storage: Arc<Storage>,
}

impl TaskCatalog {
    /// Loads the persisted catalog.
    pub fn load(storage: Arc<Storage>) -> Self {
        let tasks = match storage.get::<Vec<String>>(TASKS_KEY) {
            Ok(tasks) => tasks.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable task catalog");
                Vec::new()
            }
        };

        Self { tasks, storage }
    }

    /// Adds `name` (trimmed) unless it is blank or already present.
    ///
    /// Returns true if the catalog grew.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }

        self.tasks.push(name.to_string());
        if let Err(e) = self.storage.set(TASKS_KEY, &self.tasks) {
            tracing::warn!(error = %e, "failed to persist task catalog");
        }
        true
    }

    /// Returns true if `name` is in the catalog.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t == name)
    }

    /// Task names in insertion order.
    pub fn list(&self) -> &[String] {
        &self.tasks
    }
}
