//! Association of projects with repository providers.
//!
//! A project is mapped to at most one provider. The persistent marker (the
//! provider id in the project's persistent properties) is the source of
//! truth; the session cache ([`SessionEntry`]) only saves repeated lookups.
//!
//! ```text
//! UNMAPPED --map(id)--> MAPPED(id)
//! MAPPED(id) --unmap()--> UNMAPPED
//! MAPPED(a) --map(b)--> UNMAPPED --> MAPPED(b)
//! MAPPED(id) --map(id)--> MAPPED(id)        (no-op)
//! ```
//!
//! `map` and `unmap` hold the project rule and then the mapping lock for
//! their whole duration, provider hooks included. Lookups never take the
//! rule and only hold the mapping lock while instantiating a provider from
//! its persistent marker. The mapping lock is reentrant, so hooks may look
//! up providers of other projects.

mod session;

pub use session::SessionEntry;

use crate::cancel::CancellationToken;
use crate::config::{MappingConfig, MappingOptions};
use crate::error::{Result, TeamError};
use crate::lock::{MappingGuard, MappingLock, RuleWait, ScopedLocks};
use crate::registry::{MappedProvider, ProviderDescriptor, ProviderRegistry};
use crate::workspace::{Project, Resource, Workspace};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const KEY: &str = MappingConfig::PROVIDER_PROP_KEY;

/// Maps projects of one workspace to providers of one registry.
///
/// Create a single instance per workspace; its mapping lock is what
/// serializes every mapping transition of that workspace.
pub struct ProviderMapping {
    registry: Arc<ProviderRegistry>,
    workspace: Arc<Workspace>,
    lock: MappingLock,
    options: MappingOptions,
}

impl ProviderMapping {
    pub fn new(registry: Arc<ProviderRegistry>, workspace: Arc<Workspace>) -> Self {
        Self::with_options(registry, workspace, MappingOptions::default())
    }

    pub fn with_options(
        registry: Arc<ProviderRegistry>,
        workspace: Arc<Workspace>,
        options: MappingOptions,
    ) -> Self {
        Self {
            registry,
            workspace,
            lock: MappingLock::new(),
            options,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    // ========================================
    // Mapping transitions
    // ========================================

    /// Associate `project` with the provider registered as `id`.
    ///
    /// Mapping the id the project already has is a no-op; mapping a different
    /// id unmaps the current provider first.
    pub fn map(&self, project: &Project, id: &str) -> Result<()> {
        self.map_with_cancel(project, id, None)
    }

    /// [`Self::map`], giving up with [`TeamError::Interrupted`] if `cancel`
    /// fires while waiting for the project rule.
    pub fn map_with_cancel(
        &self,
        project: &Project,
        id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let descriptor = self
            .registry
            .descriptor(id)
            .ok_or_else(|| TeamError::UnknownProviderId { id: id.to_string() })?;

        let locks = self.acquire(project, cancel)?;
        let guard = locks.mapping();

        if project.persistent_property(KEY)?.is_some() {
            match self.resolve_locked(project, guard) {
                Ok(Some(existing)) if existing.id() == id => {
                    debug!("Project {} is already mapped to {}", project.name(), id);
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => warn!(
                    "Could not resolve current provider of {}: {}",
                    project.name(),
                    err
                ),
            }
            self.unmap_locked(project, guard)?;
        }

        // The session entry goes in first so the marker is never written
        // without a live provider behind it.
        let provider = self.map_new_provider(project, descriptor, guard)?;
        if let Err(err) = project.set_persistent_property(KEY, Some(id)) {
            if let Err(inner) = session::clear(project, guard) {
                error!(
                    "Could not clear session provider of {} after failing to map {}: {}",
                    project.name(),
                    id,
                    inner
                );
            }
            return Err(err);
        }

        if let Err(err) = provider.configure(project) {
            warn!(
                "Provider {} failed to configure {}, unmapping: {}",
                id,
                project.name(),
                err
            );
            let rollback = self.unmap_locked(project, guard).err().map(Box::new);
            return Err(TeamError::ConfigurationFailure {
                project: project.name().to_string(),
                id: id.to_string(),
                source: Box::new(err),
                rollback,
            });
        }

        project.touch();
        info!("Mapped project {} to provider {}", project.name(), id);
        Ok(())
    }

    /// Remove the provider association of `project`.
    pub fn unmap(&self, project: &Project) -> Result<()> {
        self.unmap_with_cancel(project, None)
    }

    pub fn unmap_with_cancel(
        &self,
        project: &Project,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let locks = self.acquire(project, cancel)?;
        self.unmap_locked(project, locks.mapping())
    }

    fn acquire<'a>(
        &'a self,
        project: &Project,
        cancel: Option<&CancellationToken>,
    ) -> Result<ScopedLocks<'a>> {
        let wait = RuleWait::new(cancel, self.options.rule_wait_timeout);
        ScopedLocks::acquire(self.workspace.rules(), &self.lock, project, &wait)
    }

    fn unmap_locked(&self, project: &Project, guard: &MappingGuard<'_>) -> Result<()> {
        let id = project
            .persistent_property(KEY)?
            .ok_or_else(|| TeamError::NotMapped {
                project: project.name().to_string(),
            })?;

        // Instantiating here is fine: the provider still gets its
        // deconfigure calls.
        let provider = match self.resolve_locked(project, guard) {
            Ok(provider) => provider,
            Err(err) => {
                error!(
                    "Could not instantiate provider {} of {} while unmapping: {}",
                    id,
                    project.name(),
                    err
                );
                None
            }
        };

        if let Some(provider) = &provider {
            if let Err(err) = provider.deconfigure(project) {
                warn!(
                    "Provider {} failed to deconfigure {}: {}",
                    provider.id(),
                    project.name(),
                    err
                );
            }
        }

        session::clear(project, guard)?;
        project.set_persistent_property(KEY, None)?;

        if let Some(provider) = &provider {
            provider.deconfigured(project);
        }

        project.touch();
        info!("Unmapped provider {} from project {}", id, project.name());
        Ok(())
    }

    /// Instantiate `descriptor` for `project` and cache it in the session.
    /// Nothing is cached on failure.
    fn map_new_provider(
        &self,
        project: &Project,
        descriptor: &ProviderDescriptor,
        guard: &MappingGuard<'_>,
    ) -> Result<Arc<MappedProvider>> {
        let instance = descriptor.instantiate(project)?;

        if !instance.can_handle_linked_resources() && project.has_linked_members()? {
            return Err(TeamError::LinkedResourceConflict {
                project: project.name().to_string(),
                id: descriptor.id().to_string(),
            });
        }

        let provider = Arc::new(MappedProvider::bind(descriptor.id(), project, instance));
        session::store(project, &provider, guard)?;
        debug!("Bound provider {}", provider);
        Ok(provider)
    }

    /// Current provider of `project`, instantiating it from the persistent
    /// marker if needed. Caller holds the mapping lock.
    fn resolve_locked(
        &self,
        project: &Project,
        guard: &MappingGuard<'_>,
    ) -> Result<Option<Arc<MappedProvider>>> {
        if let Some(provider) = session::cached_provider(project)? {
            return Ok(Some(provider));
        }
        match project.persistent_property(KEY)? {
            Some(id) => {
                let descriptor = self
                    .registry
                    .descriptor(&id)
                    .ok_or(TeamError::UnknownProviderId { id })?;
                self.map_new_provider(project, descriptor, guard).map(Some)
            }
            None => Ok(None),
        }
    }

    // ========================================
    // Lookups
    // ========================================

    /// The provider mapped to `project`, or `None` if there is none or the
    /// project is closed or gone. Never fails.
    pub fn get_provider(&self, project: &Project) -> Option<Arc<MappedProvider>> {
        self.lookup_or_none(project, None)
    }

    /// Like [`Self::get_provider`], but only returns a provider of type `id`.
    pub fn get_provider_with_id(&self, project: &Project, id: &str) -> Option<Arc<MappedProvider>> {
        self.lookup_or_none(project, Some(id))
    }

    /// Whether `project` has a provider. Never instantiates one.
    pub fn is_shared(&self, project: &Project) -> bool {
        if !project.is_accessible() {
            return false;
        }
        match self.check_shared(project) {
            Ok(shared) => shared,
            Err(err) => {
                if !err.is_resource_missing() {
                    warn!("Could not determine whether {} is shared: {}", project.name(), err);
                }
                false
            }
        }
    }

    fn check_shared(&self, project: &Project) -> Result<bool> {
        match session::cached(project)? {
            Some(SessionEntry::Mapped(_)) => return Ok(true),
            Some(SessionEntry::KnownUnmapped) => return Ok(false),
            None => {}
        }
        let shared = project.persistent_property(KEY)?.is_some();
        if !shared {
            self.mark_unshared(project);
        }
        Ok(shared)
    }

    fn lookup_or_none(&self, project: &Project, id: Option<&str>) -> Option<Arc<MappedProvider>> {
        if !project.is_accessible() {
            return None;
        }
        match self.lookup(project, id) {
            Ok(provider) => provider,
            Err(err) => {
                if !err.is_resource_missing() {
                    warn!("Provider lookup for {} failed: {}", project.name(), err);
                }
                None
            }
        }
    }

    fn lookup(&self, project: &Project, id: Option<&str>) -> Result<Option<Arc<MappedProvider>>> {
        match session::cached(project)? {
            Some(SessionEntry::Mapped(provider)) => return Ok(filter_id(provider, id)),
            Some(SessionEntry::KnownUnmapped) => return Ok(None),
            None => {}
        }

        if let Some(current) = project.persistent_property(KEY)? {
            if id.is_some_and(|wanted| wanted != current) {
                return Ok(None);
            }
            let provider = self.map_existing_provider(project, &current)?;
            return Ok(provider.and_then(|p| filter_id(p, id)));
        }

        if self.options.legacy_nature_lookup {
            if let Some(provider) = self.lookup_legacy(project, id)? {
                return Ok(Some(provider));
            }
        }

        self.mark_unshared(project);
        Ok(None)
    }

    /// Instantiate the provider named by the persistent marker, re-checking
    /// the marker under the mapping lock in case an unmap or remap raced us.
    fn map_existing_provider(
        &self,
        project: &Project,
        id: &str,
    ) -> Result<Option<Arc<MappedProvider>>> {
        let guard = self.lock.lock();
        match project.persistent_property(KEY)? {
            None => Ok(None),
            Some(current) if current != id => session::cached_provider(project),
            Some(_) => {
                if let Some(provider) = session::cached_provider(project)? {
                    return Ok(Some(provider));
                }
                let descriptor = self
                    .registry
                    .descriptor(id)
                    .ok_or_else(|| TeamError::UnknownProviderId { id: id.to_string() })?;
                self.map_new_provider(project, descriptor, &guard).map(Some)
            }
        }
    }

    /// Nature-based discovery for projects shared before persistent markers
    /// existed.
    fn lookup_legacy(&self, project: &Project, id: Option<&str>) -> Result<Option<Arc<MappedProvider>>> {
        let natures = self.workspace.natures();
        for nature in project.nature_ids()? {
            if id.is_some_and(|wanted| wanted != nature) || !natures.is_team_nature(&nature) {
                continue;
            }
            let Some(descriptor) = self.registry.descriptor(&nature) else {
                debug!("Legacy nature {} on {} has no registered provider", nature, project.name());
                continue;
            };

            let guard = self.lock.lock();
            if let Some(provider) = session::cached_provider(project)? {
                return Ok(filter_id(provider, id));
            }
            if project.persistent_property(KEY)?.is_some() {
                // Mapped properly in the meantime
                return Ok(self
                    .resolve_locked(project, &guard)?
                    .and_then(|p| filter_id(p, id)));
            }
            let provider = self.map_new_provider(project, descriptor, &guard)?;
            debug!("Found legacy provider {} through its nature", provider);
            return Ok(Some(provider));
        }
        Ok(None)
    }

    fn has_legacy_nature(&self, project: &Project) -> Result<bool> {
        if !self.options.legacy_nature_lookup {
            return Ok(false);
        }
        let natures = self.workspace.natures();
        Ok(project
            .nature_ids()?
            .iter()
            .any(|nature| natures.is_team_nature(nature) && self.registry.contains(nature)))
    }

    /// Record that `project` has no provider. Best effort: abandoned if the
    /// project turns out to be shared after all.
    fn mark_unshared(&self, project: &Project) {
        let guard = self.lock.lock();
        let unshared = matches!(session::cached(project), Ok(None))
            && matches!(project.persistent_property(KEY), Ok(None))
            && matches!(self.has_legacy_nature(project), Ok(false));
        if unshared {
            if let Err(err) = session::mark_unmapped(project, &guard) {
                debug!("Could not mark {} as unshared: {}", project.name(), err);
            }
        }
    }

    // ========================================
    // Supporting operations
    // ========================================

    /// Every provider type id: registered providers plus legacy team natures.
    pub fn all_provider_type_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self.registry.ids().map(str::to_string).collect();
        ids.extend(self.workspace.natures().team_nature_ids().map(str::to_string));
        ids.into_iter().collect()
    }

    /// Add a linked member to `project` if its provider allows it.
    pub fn create_link(&self, project: &Project, name: &str) -> Result<()> {
        let wait = RuleWait::new(None, self.options.rule_wait_timeout);
        let _rule = self.workspace.rules().begin_rule(project, &wait)?;
        if let Some(provider) = self.get_provider(project) {
            provider.validate_create_link(name)?;
        }
        project.add_member(Resource::linked(name))
    }
}

fn filter_id(provider: Arc<MappedProvider>, id: Option<&str>) -> Option<Arc<MappedProvider>> {
    match id {
        Some(wanted) if provider.id() != wanted => None,
        _ => Some(provider),
    }
}
