//! The provider plug-in contract and bound provider instances.

use crate::error::{Result, TeamError};
use crate::workspace::{Project, WeakProject};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A pluggable repository provider implementation.
///
/// Instances are created by a [`super::ProviderFactory`] and bound to a single
/// project by [`crate::ProviderMapping`].
pub trait RepositoryProvider: Send + Sync {
    /// Called once, after the provider has been associated with `project`.
    /// An error undoes the association.
    fn configure_project(&self, project: &Project) -> Result<()>;

    /// Called before the association is removed. Errors are logged, not
    /// propagated; unmapping proceeds regardless.
    fn deconfigure(&self, _project: &Project) -> Result<()> {
        Ok(())
    }

    /// Called after the association has been removed.
    fn deconfigured(&self, _project: &Project) {}

    /// Whether projects with linked resources can be managed. Asked before
    /// the provider is bound to a project.
    fn can_handle_linked_resources(&self) -> bool {
        false
    }
}

/// Lifecycle of a bound provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Unconfigured,
    Configured,
    Deconfigured,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "UNCONFIGURED"),
            Self::Configured => write!(f, "CONFIGURED"),
            Self::Deconfigured => write!(f, "DECONFIGURED"),
        }
    }
}

/// A provider instance bound to one project.
pub struct MappedProvider {
    id: String,
    project_name: String,
    project: WeakProject,
    provider: Box<dyn RepositoryProvider>,
    state: Mutex<ProviderState>,
}

impl MappedProvider {
    pub(crate) fn bind(id: &str, project: &Project, provider: Box<dyn RepositoryProvider>) -> Self {
        Self {
            id: id.to_string(),
            project_name: project.name().to_string(),
            project: project.downgrade(),
            provider,
            state: Mutex::new(ProviderState::Unconfigured),
        }
    }

    /// Id of the descriptor this provider was created from.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// The bound project, while it is still alive.
    pub fn project(&self) -> Option<Project> {
        self.project.upgrade()
    }

    pub fn state(&self) -> ProviderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn can_handle_linked_resources(&self) -> bool {
        self.provider.can_handle_linked_resources()
    }

    /// Check whether a linked resource may be created in the bound project.
    pub fn validate_create_link(&self, resource: &str) -> Result<()> {
        if self.can_handle_linked_resources() {
            return Ok(());
        }
        debug!(
            "Provider {} rejected linked resource {} in {}",
            self.id, resource, self.project_name
        );
        Err(TeamError::LinkedResourceConflict {
            project: self.project_name.clone(),
            id: self.id.clone(),
        })
    }

    /// The plug-in behind this binding.
    pub fn provider(&self) -> &dyn RepositoryProvider {
        self.provider.as_ref()
    }

    pub(crate) fn configure(&self, project: &Project) -> Result<()> {
        self.provider.configure_project(project)?;
        self.set_state(ProviderState::Configured);
        Ok(())
    }

    pub(crate) fn deconfigure(&self, project: &Project) -> Result<()> {
        self.provider.deconfigure(project)
    }

    pub(crate) fn deconfigured(&self, project: &Project) {
        self.set_state(ProviderState::Deconfigured);
        self.provider.deconfigured(project);
    }

    fn set_state(&self, state: ProviderState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl fmt::Display for MappedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_name, self.id)
    }
}

impl fmt::Debug for MappedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedProvider")
            .field("id", &self.id)
            .field("project", &self.project_name)
            .field("state", &self.state())
            .finish()
    }
}
