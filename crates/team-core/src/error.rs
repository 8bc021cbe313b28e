//! Error types for repository provider mapping.
//!
//! Structural failures (unknown provider, linked-resource conflict, missing
//! mapping) are returned to the caller as-is. Lookups normalise every error to
//! "no provider" and only use [`TeamError::is_resource_missing`] to decide
//! whether the failure is worth logging.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for team operations.
#[derive(Debug, Error)]
pub enum TeamError {
    // Registry errors
    #[error("No repository provider registered with id {id}")]
    UnknownProviderId { id: String },

    #[error("Could not instantiate provider {id} for project {project}: {message}")]
    InstantiationFailed {
        project: String,
        id: String,
        message: String,
    },

    // Mapping errors
    #[error("Project {project} contains linked resources but provider {id} does not support them")]
    LinkedResourceConflict { project: String, id: String },

    #[error("No repository provider is mapped to project {project}")]
    NotMapped { project: String },

    #[error("Provider {id} failed to configure project {project}: {source}")]
    ConfigurationFailure {
        project: String,
        id: String,
        #[source]
        source: Box<TeamError>,
        /// Failure of the automatic unmap that followed, if any
        rollback: Option<Box<TeamError>>,
    },

    #[error("Provider {id} failed: {message}")]
    ProviderFailed { id: String, message: String },

    // Resource errors
    #[error("Resource not found: {project}")]
    ResourceNotFound { project: String },

    #[error("Project is closed: {project}")]
    ProjectClosed { project: String },

    #[error("Project already exists: {project}")]
    ProjectExists { project: String },

    // Locking errors
    #[error("Waiting for the project rule was interrupted")]
    Interrupted,

    #[error("Timed out after {0:?} waiting for the project rule")]
    Timeout(Duration),

    #[error("Lock order violation: {detail}")]
    LockOrder { detail: &'static str },

    // Store errors
    #[error("Property store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for team operations.
pub type Result<T> = std::result::Result<T, TeamError>;

impl From<std::io::Error> for TeamError {
    fn from(err: std::io::Error) -> Self {
        TeamError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TeamError {
    fn from(err: serde_json::Error) -> Self {
        TeamError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for TeamError {
    fn from(err: rusqlite::Error) -> Self {
        TeamError::Store {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl TeamError {
    /// Create a store error without an underlying database cause.
    pub fn store(message: impl Into<String>) -> Self {
        TeamError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        TeamError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a provider hook failure.
    pub fn provider(id: impl Into<String>, message: impl Into<String>) -> Self {
        TeamError::ProviderFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Whether this error only says that the project is gone.
    ///
    /// Lookups treat such failures as "no provider" without logging them.
    pub fn is_resource_missing(&self) -> bool {
        matches!(
            self,
            TeamError::ResourceNotFound { .. } | TeamError::ProjectClosed { .. }
        )
    }

    /// Whether the mapping state was left untouched by this failure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TeamError::UnknownProviderId { .. }
                | TeamError::LinkedResourceConflict { .. }
                | TeamError::NotMapped { .. }
        )
    }
}
