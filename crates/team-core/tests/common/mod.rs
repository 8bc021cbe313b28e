//! Shared fixtures for the mapping integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use team_core::{
    MemoryPropertyStore, Project, PropertyStore, ProviderMapping, ProviderRegistry,
    RepositoryProvider, Result, TeamError, Workspace,
};

/// Hook call counts for one provider type.
#[derive(Debug, Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub configured: AtomicUsize,
    pub deconfigure_calls: AtomicUsize,
    pub deconfigured: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn deconfigure_calls(&self) -> usize {
        self.deconfigure_calls.load(Ordering::SeqCst)
    }

    pub fn deconfigured(&self) -> usize {
        self.deconfigured.load(Ordering::SeqCst)
    }
}

/// Provider that records its hook calls.
pub struct RecordingProvider {
    counters: Arc<Counters>,
    fail_configure: bool,
    fail_deconfigure: bool,
    handles_links: bool,
}

impl RepositoryProvider for RecordingProvider {
    fn configure_project(&self, _project: &Project) -> Result<()> {
        if self.fail_configure {
            return Err(TeamError::provider("recording", "configure refused"));
        }
        self.counters.configured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deconfigure(&self, _project: &Project) -> Result<()> {
        self.counters.deconfigure_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deconfigure {
            return Err(TeamError::provider("recording", "deconfigure refused"));
        }
        Ok(())
    }

    fn deconfigured(&self, _project: &Project) {
        self.counters.deconfigured.fetch_add(1, Ordering::SeqCst);
    }

    fn can_handle_linked_resources(&self) -> bool {
        self.handles_links
    }
}

/// How a test provider type behaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    pub fail_configure: bool,
    pub fail_deconfigure: bool,
    pub handles_links: bool,
}

/// Registry builder that hands out counters per provider id.
#[derive(Default)]
pub struct TestRegistry {
    entries: Vec<(String, Behavior, Arc<Counters>)>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, id: &str, behavior: Behavior) -> Self {
        self.entries
            .push((id.to_string(), behavior, Arc::new(Counters::default())));
        self
    }

    pub fn counters(&self, id: &str) -> Arc<Counters> {
        self.entries
            .iter()
            .find(|(entry_id, _, _)| entry_id == id)
            .map(|(_, _, counters)| counters.clone())
            .expect("provider registered")
    }

    pub fn build(&self) -> ProviderRegistry {
        let mut builder = ProviderRegistry::builder();
        for (id, behavior, counters) in &self.entries {
            let behavior = *behavior;
            let counters = counters.clone();
            builder = builder.register(
                id.clone(),
                move |_id: &str| -> Result<Box<dyn RepositoryProvider>> {
                    counters.created.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(RecordingProvider {
                        counters: counters.clone(),
                        fail_configure: behavior.fail_configure,
                        fail_deconfigure: behavior.fail_deconfigure,
                        handles_links: behavior.handles_links,
                    }))
                },
            );
        }
        builder.build().expect("registry")
    }
}

/// Property store that can be told to fail and counts reads.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryPropertyStore,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl PropertyStore for FlakyStore {
    fn get(&self, project: &str, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TeamError::store("read failed"));
        }
        self.inner.get(project, key)
    }

    fn set(&self, project: &str, key: &str, value: Option<&str>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TeamError::store("write failed"));
        }
        self.inner.set(project, key, value)
    }

    fn remove_project(&self, project: &str) -> Result<usize> {
        self.inner.remove_project(project)
    }
}

/// A mapping over a fresh workspace backed by `store`.
pub fn create_mapping(
    registry: ProviderRegistry,
    store: Arc<dyn PropertyStore>,
) -> (ProviderMapping, Arc<Workspace>) {
    let workspace = Arc::new(Workspace::new(store));
    let mapping = ProviderMapping::new(Arc::new(registry), workspace.clone());
    (mapping, workspace)
}

pub fn memory_store() -> Arc<dyn PropertyStore> {
    Arc::new(MemoryPropertyStore::new())
}

pub fn marker(project: &Project) -> Option<String> {
    project
        .persistent_property(team_core::MappingConfig::PROVIDER_PROP_KEY)
        .unwrap()
}
