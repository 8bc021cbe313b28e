//! Projects and the workspace that owns them.
//!
//! A [`Project`] is a cheap, clonable handle. Besides its members and nature
//! ids it exposes two property stores:
//! - persistent properties, delegated to the workspace's [`PropertyStore`]
//! - session properties, an in-memory map cleared whenever the project closes
//!
//! Property access on a deleted project fails with
//! [`TeamError::ResourceNotFound`]; on a closed one with
//! [`TeamError::ProjectClosed`].

use crate::config::MappingConfig;
use crate::error::{Result, TeamError};
use crate::lock::RuleManager;
use crate::mapping::SessionEntry;
use crate::store::PropertyStore;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::debug;

/// Value stored in a project's session map.
pub type SessionValue = Arc<dyn Any + Send + Sync>;

/// A top-level member of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    /// Linked resources point outside the project's own location.
    #[serde(default)]
    pub linked: bool,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            linked: false,
        }
    }

    pub fn linked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            linked: true,
        }
    }
}

#[derive(Debug)]
struct ProjectState {
    exists: bool,
    open: bool,
    members: Vec<Resource>,
    natures: Vec<String>,
}

struct ProjectInner {
    name: String,
    store: Arc<dyn PropertyStore>,
    state: RwLock<ProjectState>,
    session: Mutex<HashMap<String, SessionValue>>,
    stamp: AtomicU64,
}

/// Handle to a resource container.
#[derive(Clone)]
pub struct Project {
    inner: Arc<ProjectInner>,
}

/// Non-owning project handle, held by mapped providers.
#[derive(Clone)]
pub struct WeakProject {
    inner: Weak<ProjectInner>,
}

impl WeakProject {
    pub fn upgrade(&self) -> Option<Project> {
        self.inner.upgrade().map(|inner| Project { inner })
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Project {}

impl Project {
    fn new(name: &str, store: Arc<dyn PropertyStore>) -> Self {
        Self {
            inner: Arc::new(ProjectInner {
                name: name.to_string(),
                store,
                state: RwLock::new(ProjectState {
                    exists: true,
                    open: true,
                    members: Vec::new(),
                    natures: Vec::new(),
                }),
                session: Mutex::new(HashMap::new()),
                stamp: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn downgrade(&self) -> WeakProject {
        WeakProject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn exists(&self) -> bool {
        self.read_state().exists
    }

    pub fn is_open(&self) -> bool {
        let state = self.read_state();
        state.exists && state.open
    }

    /// Exists and is open.
    pub fn is_accessible(&self) -> bool {
        self.is_open()
    }

    /// Open the project. Opening an open project does nothing.
    pub fn open(&self) -> Result<()> {
        let mut state = self.write_state();
        if !state.exists {
            return Err(self.not_found());
        }
        state.open = true;
        Ok(())
    }

    /// Close the project, discarding its session properties.
    pub fn close(&self) -> Result<()> {
        let mut state = self.write_state();
        if !state.exists {
            return Err(self.not_found());
        }
        state.open = false;
        // Cleared under the state lock so no session write can slip in
        // between the flag change and the clear.
        self.session().clear();
        drop(state);
        debug!("Closed project {}", self.name());
        Ok(())
    }

    /// Top-level members.
    pub fn members(&self) -> Result<Vec<Resource>> {
        let state = self.accessible_state()?;
        Ok(state.members.clone())
    }

    /// Add a member without consulting any provider.
    ///
    /// Linked members normally go through
    /// [`crate::ProviderMapping::create_link`], which lets the mapped
    /// provider veto them.
    pub fn add_member(&self, resource: Resource) -> Result<()> {
        let mut state = self.write_state();
        self.check_accessible(&state)?;
        state.members.retain(|m| m.name != resource.name);
        state.members.push(resource);
        drop(state);
        self.touch();
        Ok(())
    }

    pub fn remove_member(&self, name: &str) -> Result<bool> {
        let mut state = self.write_state();
        self.check_accessible(&state)?;
        let before = state.members.len();
        state.members.retain(|m| m.name != name);
        let removed = state.members.len() != before;
        drop(state);
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    pub fn has_linked_members(&self) -> Result<bool> {
        Ok(self.accessible_state()?.members.iter().any(|m| m.linked))
    }

    pub fn nature_ids(&self) -> Result<Vec<String>> {
        Ok(self.accessible_state()?.natures.clone())
    }

    /// Add a nature id. Invalidates a cached "known unmapped" marker, since
    /// the nature may make a legacy provider discoverable.
    pub fn add_nature(&self, nature_id: impl Into<String>) -> Result<()> {
        let nature_id = nature_id.into();
        let mut state = self.write_state();
        self.check_accessible(&state)?;
        if !state.natures.contains(&nature_id) {
            state.natures.push(nature_id);
        }
        drop(state);
        self.forget_unmapped();
        self.touch();
        Ok(())
    }

    pub fn remove_nature(&self, nature_id: &str) -> Result<bool> {
        let mut state = self.write_state();
        self.check_accessible(&state)?;
        let before = state.natures.len();
        state.natures.retain(|n| n != nature_id);
        let removed = state.natures.len() != before;
        drop(state);
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    pub fn persistent_property(&self, key: &str) -> Result<Option<String>> {
        self.check_accessible(&self.read_state())?;
        self.inner.store.get(self.name(), key)
    }

    pub fn set_persistent_property(&self, key: &str, value: Option<&str>) -> Result<()> {
        self.check_accessible(&self.read_state())?;
        self.inner.store.set(self.name(), key, value)
    }

    pub fn session_property(&self, key: &str) -> Result<Option<SessionValue>> {
        let _state = self.accessible_state()?;
        Ok(self.session().get(key).cloned())
    }

    /// Set or remove a session property. The state lock is held across the
    /// write, so a concurrent [`Self::close`] either sees the entry and
    /// clears it, or makes this call fail.
    pub fn set_session_property(&self, key: &str, value: Option<SessionValue>) -> Result<()> {
        let _state = self.accessible_state()?;
        let mut session = self.session();
        match value {
            Some(value) => {
                session.insert(key.to_string(), value);
            }
            None => {
                session.remove(key);
            }
        }
        Ok(())
    }

    /// Bump the modification stamp so observers notice a change.
    pub fn touch(&self) {
        self.inner.stamp.fetch_add(1, Ordering::SeqCst);
    }

    pub fn modification_stamp(&self) -> u64 {
        self.inner.stamp.load(Ordering::SeqCst)
    }

    fn forget_unmapped(&self) {
        let mut session = self.session();
        let unmapped = session
            .get(MappingConfig::PROVIDER_PROP_KEY)
            .and_then(|value| value.downcast_ref::<SessionEntry>())
            .is_some_and(SessionEntry::is_known_unmapped);
        if unmapped {
            session.remove(MappingConfig::PROVIDER_PROP_KEY);
        }
    }

    fn mark_deleted(&self) {
        let mut state = self.write_state();
        state.exists = false;
        state.open = false;
        self.session().clear();
        drop(state);
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ProjectState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ProjectState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionValue>> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accessible_state(&self) -> Result<std::sync::RwLockReadGuard<'_, ProjectState>> {
        let state = self.read_state();
        self.check_accessible(&state)?;
        Ok(state)
    }

    fn check_accessible(&self, state: &ProjectState) -> Result<()> {
        if !state.exists {
            return Err(self.not_found());
        }
        if !state.open {
            return Err(TeamError::ProjectClosed {
                project: self.name().to_string(),
            });
        }
        Ok(())
    }

    fn not_found(&self) -> TeamError {
        TeamError::ResourceNotFound {
            project: self.name().to_string(),
        }
    }
}

/// Nature descriptors: nature id to the nature sets it belongs to.
///
/// Only consulted by the legacy lookup path, which treats natures in
/// [`MappingConfig::TEAM_SET_ID`] as repository providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NatureCatalog {
    natures: BTreeMap<String, BTreeSet<String>>,
}

impl NatureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I, S>(&mut self, nature_id: impl Into<String>, set_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natures
            .entry(nature_id.into())
            .or_default()
            .extend(set_ids.into_iter().map(Into::into));
    }

    pub fn contains(&self, nature_id: &str) -> bool {
        self.natures.contains_key(nature_id)
    }

    pub fn is_team_nature(&self, nature_id: &str) -> bool {
        self.natures
            .get(nature_id)
            .is_some_and(|sets| sets.contains(MappingConfig::TEAM_SET_ID))
    }

    pub fn team_nature_ids(&self) -> impl Iterator<Item = &str> {
        self.natures
            .iter()
            .filter(|(_, sets)| sets.contains(MappingConfig::TEAM_SET_ID))
            .map(|(id, _)| id.as_str())
    }
}

/// Declarative description of a workspace, as loaded by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    #[serde(default)]
    pub natures: NatureCatalog,
    #[serde(default)]
    pub projects: Vec<ProjectManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub name: String,
    #[serde(default = "default_open")]
    pub open: bool,
    #[serde(default)]
    pub members: Vec<Resource>,
    #[serde(default)]
    pub natures: Vec<String>,
}

fn default_open() -> bool {
    true
}

/// Owner of projects and of the host services the mapping protocol uses.
pub struct Workspace {
    store: Arc<dyn PropertyStore>,
    projects: RwLock<BTreeMap<String, Project>>,
    natures: NatureCatalog,
    rules: RuleManager,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("projects", &self.project_names())
            .field("natures", &self.natures)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self {
            store,
            projects: RwLock::new(BTreeMap::new()),
            natures: NatureCatalog::new(),
            rules: RuleManager::new(),
        }
    }

    pub fn with_natures(mut self, natures: NatureCatalog) -> Self {
        self.natures = natures;
        self
    }

    /// Build a workspace from a manifest. Persistent properties already in
    /// `store` are picked up by the new projects.
    pub fn from_manifest(manifest: WorkspaceManifest, store: Arc<dyn PropertyStore>) -> Result<Self> {
        let workspace = Self::new(store).with_natures(manifest.natures);
        for entry in manifest.projects {
            let project = workspace.create_project(&entry.name)?;
            for member in entry.members {
                project.add_member(member)?;
            }
            for nature in entry.natures {
                project.add_nature(nature)?;
            }
            if !entry.open {
                project.close()?;
            }
        }
        Ok(workspace)
    }

    pub fn create_project(&self, name: &str) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(TeamError::Config {
                message: "Project name must not be empty".to_string(),
            });
        }
        let mut projects = self.projects.write().unwrap_or_else(PoisonError::into_inner);
        if projects.contains_key(name) {
            return Err(TeamError::ProjectExists {
                project: name.to_string(),
            });
        }
        let project = Project::new(name, self.store.clone());
        projects.insert(name.to_string(), project.clone());
        debug!("Created project {}", name);
        Ok(project)
    }

    pub fn project(&self, name: &str) -> Option<Project> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Delete a project and its persistent properties. Outstanding handles
    /// report [`TeamError::ResourceNotFound`] afterwards.
    pub fn delete_project(&self, name: &str) -> Result<bool> {
        let removed = self
            .projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(project) => {
                project.mark_deleted();
                self.store.remove_project(name)?;
                debug!("Deleted project {}", name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn natures(&self) -> &NatureCatalog {
        &self.natures
    }

    pub fn rules(&self) -> &RuleManager {
        &self.rules
    }

    pub fn store(&self) -> &Arc<dyn PropertyStore> {
        &self.store
    }
}
