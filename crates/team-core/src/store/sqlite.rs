//! SQLite-backed persistent property store.

use super::PropertyStore;
use crate::config::RegistryConfig;
use crate::error::{Result, TeamError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistent properties in a SQLite database.
///
/// Uses WAL mode so several processes can share one database, and
/// `Arc<Mutex<Connection>>` for thread safety within a process.
#[derive(Clone)]
pub struct SqlitePropertyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePropertyStore {
    /// Open the store at the platform config location
    /// (e.g. `~/.config/team/properties.db` on Linux).
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| TeamError::Config {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(base
            .join(RegistryConfig::CONFIG_DIR_NAME)
            .join(RegistryConfig::DB_FILENAME))
    }

    /// Open the store at a specific path, creating parent directories.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| TeamError::Io {
                    message: format!("Failed to create store directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        debug!("Opened property store at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            RegistryConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS persistent_properties (
                project TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (project, key)
            );",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TeamError::store("Failed to acquire property store connection lock"))
    }
}

impl PropertyStore for SqlitePropertyStore {
    fn get(&self, project: &str, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM persistent_properties WHERE project = ?1 AND key = ?2",
                params![project, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, project: &str, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self.lock_conn()?;
        match value {
            Some(value) => {
                conn.execute(
                    "INSERT INTO persistent_properties (project, key, value, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(project, key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![project, key, value, Utc::now().to_rfc3339()],
                )?;
                debug!("Set {} on {} to {}", key, project, value);
            }
            None => {
                conn.execute(
                    "DELETE FROM persistent_properties WHERE project = ?1 AND key = ?2",
                    params![project, key],
                )?;
                debug!("Cleared {} on {}", key, project);
            }
        }
        Ok(())
    }

    fn remove_project(&self, project: &str) -> Result<usize> {
        let conn = self.lock_conn()?;
        let rows = conn.execute(
            "DELETE FROM persistent_properties WHERE project = ?1",
            params![project],
        )?;
        Ok(rows)
    }
}
