//! Team Core - repository provider mapping for workspace projects.
//!
//! A project is associated with at most one repository provider. The
//! association is recorded as a persistent marker (the provider id) that
//! survives restarts, and cached per session as the resolved provider
//! instance, or as "known unmapped".
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use team_core::{MemoryPropertyStore, ProviderMapping, ProviderRegistry, Workspace};
//!
//! let registry = ProviderRegistry::builder()
//!     .register("team.git", git_factory)
//!     .build()?;
//! let workspace = Arc::new(Workspace::new(Arc::new(MemoryPropertyStore::new())));
//! let project = workspace.create_project("alpha")?;
//!
//! let mapping = ProviderMapping::new(Arc::new(registry), workspace);
//! mapping.map(&project, "team.git")?;
//! assert!(mapping.is_shared(&project));
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
pub mod mapping;
pub mod registry;
pub mod store;
pub mod workspace;

pub use cancel::{CancellationToken, CancelledError};
pub use config::{MappingConfig, MappingOptions};
pub use error::{Result, TeamError};
pub use lock::{MappingGuard, MappingLock, RuleGuard, RuleManager, RuleWait, ScopedLocks};
pub use mapping::{ProviderMapping, SessionEntry};
pub use registry::{
    FactoryCatalog, MappedProvider, ProviderDescriptor, ProviderFactory, ProviderManifest,
    ProviderRegistry, ProviderState, RepositoryProvider,
};
pub use store::{JsonPropertyStore, MemoryPropertyStore, PropertyStore, SqlitePropertyStore};
pub use workspace::{
    NatureCatalog, Project, ProjectManifest, Resource, Workspace, WorkspaceManifest,
};
