//! JSON-file persistent property store.

use super::atomic::{atomic_read_json, atomic_write_json};
use super::PropertyStore;
use crate::error::{Result, TeamError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

type PropertyData = BTreeMap<String, BTreeMap<String, String>>;

/// Persistent properties kept in one JSON document.
///
/// The whole document is cached in memory and rewritten atomically on every
/// change, so a crash leaves either the old or the new version on disk.
#[derive(Debug)]
pub struct JsonPropertyStore {
    path: PathBuf,
    keep_backup: bool,
    data: RwLock<PropertyData>,
}

impl JsonPropertyStore {
    /// Open (or start) the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data: PropertyData = atomic_read_json(&path)?.unwrap_or_default();
        debug!(
            "Loaded {} projects from property file {}",
            data.len(),
            path.display()
        );
        Ok(Self {
            path,
            keep_backup: false,
            data: RwLock::new(data),
        })
    }

    /// Keep the previous document as `<name>.json.bak` on every write.
    pub fn with_backup(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn poisoned() -> TeamError {
        TeamError::store("Property file lock poisoned")
    }
}

impl PropertyStore for JsonPropertyStore {
    fn get(&self, project: &str, key: &str) -> Result<Option<String>> {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data.get(project).and_then(|entries| entries.get(key)).cloned())
    }

    fn set(&self, project: &str, key: &str, value: Option<&str>) -> Result<()> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        let mut updated = data.clone();
        match value {
            Some(value) => {
                updated
                    .entry(project.to_string())
                    .or_default()
                    .insert(key.to_string(), value.to_string());
            }
            None => {
                if let Some(entries) = updated.get_mut(project) {
                    entries.remove(key);
                    if entries.is_empty() {
                        updated.remove(project);
                    }
                }
            }
        }

        // Only swap the cache once the document is on disk.
        atomic_write_json(&self.path, &updated, self.keep_backup)?;
        *data = updated;
        Ok(())
    }

    fn remove_project(&self, project: &str) -> Result<usize> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        let removed = match data.get(project) {
            Some(entries) => entries.len(),
            None => return Ok(0),
        };
        let mut updated = data.clone();
        updated.remove(project);
        atomic_write_json(&self.path, &updated, self.keep_backup)?;
        *data = updated;
        Ok(removed)
    }
}
