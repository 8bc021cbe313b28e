//! Durable per-project property stores.
//!
//! The persistent provider marker lives here. Three backends are provided:
//! - [`SqlitePropertyStore`]: SQLite database, safe across processes
//! - [`JsonPropertyStore`]: a single JSON document written atomically
//! - [`MemoryPropertyStore`]: process-local, for tests and embedding

pub mod atomic;
mod json;
mod sqlite;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use json::JsonPropertyStore;
pub use sqlite::SqlitePropertyStore;

use crate::error::Result;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Key-value store scoped per project, surviving process restarts.
pub trait PropertyStore: Send + Sync {
    /// Read a property. `None` means unset.
    fn get(&self, project: &str, key: &str) -> Result<Option<String>>;

    /// Write a property; `None` removes it.
    fn set(&self, project: &str, key: &str, value: Option<&str>) -> Result<()>;

    /// Drop every property of a project. Returns the number removed.
    fn remove_project(&self, project: &str) -> Result<usize>;
}

/// In-memory [`PropertyStore`].
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    properties: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, project: &str, key: &str) -> Result<Option<String>> {
        let properties = self.properties.read().unwrap_or_else(PoisonError::into_inner);
        Ok(properties
            .get(project)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, project: &str, key: &str, value: Option<&str>) -> Result<()> {
        let mut properties = self
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(value) => {
                properties
                    .entry(project.to_string())
                    .or_default()
                    .insert(key.to_string(), value.to_string());
            }
            None => {
                if let Some(entries) = properties.get_mut(project) {
                    entries.remove(key);
                    if entries.is_empty() {
                        properties.remove(project);
                    }
                }
            }
        }
        Ok(())
    }

    fn remove_project(&self, project: &str) -> Result<usize> {
        let mut properties = self
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(properties.remove(project).map(|e| e.len()).unwrap_or(0))
    }
}
