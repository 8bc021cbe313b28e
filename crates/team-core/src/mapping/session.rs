//! Session cache of resolved providers.
//!
//! The cache lives in the project's session properties under
//! [`MappingConfig::PROVIDER_PROP_KEY`]. Absent means "not yet resolved".
//! Writers must hold the mapping lock.

use crate::config::MappingConfig;
use crate::error::Result;
use crate::lock::MappingGuard;
use crate::registry::MappedProvider;
use crate::workspace::Project;
use std::sync::Arc;

/// Resolved provider state of a project.
#[derive(Debug, Clone)]
pub enum SessionEntry {
    Mapped(Arc<MappedProvider>),
    /// Negative cache: the project was looked up and has no provider.
    KnownUnmapped,
}

impl SessionEntry {
    pub fn is_known_unmapped(&self) -> bool {
        matches!(self, SessionEntry::KnownUnmapped)
    }

    pub fn provider(&self) -> Option<&Arc<MappedProvider>> {
        match self {
            SessionEntry::Mapped(provider) => Some(provider),
            SessionEntry::KnownUnmapped => None,
        }
    }
}

pub(crate) fn cached(project: &Project) -> Result<Option<SessionEntry>> {
    Ok(project
        .session_property(MappingConfig::PROVIDER_PROP_KEY)?
        .and_then(|value| value.downcast_ref::<SessionEntry>().cloned()))
}

pub(crate) fn cached_provider(project: &Project) -> Result<Option<Arc<MappedProvider>>> {
    Ok(cached(project)?.and_then(|entry| entry.provider().cloned()))
}

pub(crate) fn store(
    project: &Project,
    provider: &Arc<MappedProvider>,
    _guard: &MappingGuard<'_>,
) -> Result<()> {
    project.set_session_property(
        MappingConfig::PROVIDER_PROP_KEY,
        Some(Arc::new(SessionEntry::Mapped(provider.clone()))),
    )
}

pub(crate) fn mark_unmapped(project: &Project, _guard: &MappingGuard<'_>) -> Result<()> {
    project.set_session_property(
        MappingConfig::PROVIDER_PROP_KEY,
        Some(Arc::new(SessionEntry::KnownUnmapped)),
    )
}

pub(crate) fn clear(project: &Project, _guard: &MappingGuard<'_>) -> Result<()> {
    project.set_session_property(MappingConfig::PROVIDER_PROP_KEY, None)
}
