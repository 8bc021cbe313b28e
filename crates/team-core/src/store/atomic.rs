//! Atomic JSON persistence.
//!
//! Writes go to a temp file named with PID and thread suffixes, are synced
//! to disk, and then renamed over the target so readers never observe a
//! partially written document.

use crate::error::{Result, TeamError};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;
use std::process;
use std::thread;
use tracing::{debug, warn};

/// Read and parse a JSON file. Returns `None` if the file doesn't exist.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TeamError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| TeamError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write `data` to `path` atomically, optionally keeping the previous
/// version as `<name>.json.bak`.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| TeamError::io_with_path(e, parent))?;
        }
    }

    let temp_path = path.with_extension(format!("json.{}.{}.tmp", process::id(), thread_id()));

    let serialized = serde_json::to_string_pretty(data).map_err(|e| TeamError::Json {
        message: format!("Failed to serialize {}: {}", path.display(), e),
        source: Some(e),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| TeamError::io_with_path(e, &temp_path))?;

        file.write_all(serialized.as_bytes())
            .map_err(|e| TeamError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| TeamError::io_with_path(e, &temp_path))?;
    }

    if keep_backup && path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            // Not fatal: the new document is still written.
            warn!("Failed to create backup {}: {}", backup_path.display(), e);
        }
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(TeamError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn thread_id() -> u64 {
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}
