//! Provider descriptors and the immutable registry built at startup.

use super::provider::RepositoryProvider;
use crate::error::{Result, TeamError};
use crate::store::atomic_read_json;
use crate::workspace::Project;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates fresh provider instances.
///
/// `id` is the id of the descriptor being instantiated, so one factory can
/// back several manifest entries.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, id: &str) -> Result<Box<dyn RepositoryProvider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&str) -> Result<Box<dyn RepositoryProvider>> + Send + Sync,
{
    fn create(&self, id: &str) -> Result<Box<dyn RepositoryProvider>> {
        self(id)
    }
}

/// A registered provider type.
#[derive(Clone)]
pub struct ProviderDescriptor {
    id: String,
    name: Option<String>,
    factory: Arc<dyn ProviderFactory>,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            id: id.into(),
            name: None,
            factory,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name, falling back to the id.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Create a new provider instance destined for `project`.
    pub fn instantiate(&self, project: &Project) -> Result<Box<dyn RepositoryProvider>> {
        self.factory
            .create(&self.id)
            .map_err(|e| TeamError::InstantiationFailed {
                project: project.name().to_string(),
                id: self.id.clone(),
                message: e.to_string(),
            })
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Immutable set of known provider types.
///
/// Built once with [`ProviderRegistry::builder`] and shared by `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    descriptors: BTreeMap<String, ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    pub fn descriptor(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Named factories that manifest entries can refer to.
#[derive(Default, Clone)]
pub struct FactoryCatalog {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, factory: impl ProviderFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.get(name).cloned()
    }
}

/// Manifest file listing provider extensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderManifest {
    #[serde(default)]
    pub providers: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    /// Catalog name of the factory building this provider.
    pub factory: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Collects descriptors, then freezes them into a [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    descriptors: BTreeMap<String, ProviderDescriptor>,
    duplicates: Vec<String>,
}

impl ProviderRegistryBuilder {
    /// Register a provider type built by `factory`.
    pub fn register(self, id: impl Into<String>, factory: impl ProviderFactory + 'static) -> Self {
        self.register_descriptor(ProviderDescriptor::new(id, Arc::new(factory)))
    }

    pub fn register_descriptor(mut self, descriptor: ProviderDescriptor) -> Self {
        let id = descriptor.id.clone();
        if self.descriptors.insert(id.clone(), descriptor).is_some() {
            self.duplicates.push(id);
        }
        self
    }

    /// Add every entry of a manifest, resolving factories through `catalog`.
    pub fn manifest(mut self, manifest: ProviderManifest, catalog: &FactoryCatalog) -> Result<Self> {
        for entry in manifest.providers {
            let factory = catalog.get(&entry.factory).ok_or_else(|| TeamError::Config {
                message: format!(
                    "Provider {} names unknown factory {}",
                    entry.id, entry.factory
                ),
            })?;
            let mut descriptor = ProviderDescriptor::new(entry.id, factory);
            if let Some(name) = entry.name {
                descriptor = descriptor.with_name(name);
            }
            debug!("Declared provider {} from manifest", descriptor.id());
            self = self.register_descriptor(descriptor);
        }
        Ok(self)
    }

    /// Read a JSON manifest from disk and add its entries.
    pub fn load_manifest(self, path: &Path, catalog: &FactoryCatalog) -> Result<Self> {
        let manifest: ProviderManifest =
            atomic_read_json(path)?.ok_or_else(|| TeamError::Config {
                message: format!("Provider manifest not found: {}", path.display()),
            })?;
        self.manifest(manifest, catalog)
    }

    /// Freeze the registry. Fails if any id was registered twice.
    pub fn build(self) -> Result<ProviderRegistry> {
        if !self.duplicates.is_empty() {
            return Err(TeamError::Config {
                message: format!(
                    "Duplicate provider ids: {}",
                    self.duplicates.join(", ")
                ),
            });
        }
        info!("Provider registry initialized with {} providers", self.descriptors.len());
        Ok(ProviderRegistry {
            descriptors: self.descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPropertyStore;
    use crate::workspace::Workspace;
    use tempfile::TempDir;

    struct Noop;

    impl RepositoryProvider for Noop {
        fn configure_project(&self, _project: &Project) -> Result<()> {
            Ok(())
        }
    }

    fn noop(_id: &str) -> Result<Box<dyn RepositoryProvider>> {
        Ok(Box::new(Noop))
    }

    fn broken(_id: &str) -> Result<Box<dyn RepositoryProvider>> {
        Err(TeamError::Other("class not found".to_string()))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ProviderRegistry::builder()
            .register("git", noop)
            .register("svn", noop)
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("git"));
        assert!(registry.descriptor("cvs").is_none());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["git", "svn"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = ProviderRegistry::builder()
            .register("git", noop)
            .register("git", noop)
            .build();
        assert!(matches!(result, Err(TeamError::Config { .. })));
    }

    #[test]
    fn test_instantiate_failure_names_project() {
        let workspace = Workspace::new(Arc::new(MemoryPropertyStore::new()));
        let project = workspace.create_project("alpha").unwrap();
        let registry = ProviderRegistry::builder()
            .register("broken", broken)
            .build()
            .unwrap();

        let err = registry
            .descriptor("broken")
            .unwrap()
            .instantiate(&project)
            .err()
            .unwrap();
        match err {
            TeamError::InstantiationFailed { project, id, message } => {
                assert_eq!(project, "alpha");
                assert_eq!(id, "broken");
                assert_eq!(message, "class not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("providers.json");
        std::fs::write(
            &path,
            r#"{ "providers": [
                { "id": "team.git", "factory": "noop", "name": "Git" },
                { "id": "team.svn", "factory": "noop" }
            ] }"#,
        )
        .unwrap();

        let mut catalog = FactoryCatalog::new();
        catalog.insert("noop", noop);

        let registry = ProviderRegistry::builder()
            .load_manifest(&path, &catalog)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(registry.descriptor("team.git").unwrap().name(), "Git");
        assert_eq!(registry.descriptor("team.svn").unwrap().name(), "team.svn");
    }

    #[test]
    fn test_manifest_unknown_factory() {
        let manifest = ProviderManifest {
            providers: vec![ManifestEntry {
                id: "team.git".to_string(),
                factory: "missing".to_string(),
                name: None,
            }],
        };
        let result = ProviderRegistry::builder().manifest(manifest, &FactoryCatalog::new());
        assert!(matches!(result, Err(TeamError::Config { .. })));
    }

    #[test]
    fn test_missing_manifest_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ProviderRegistry::builder()
            .load_manifest(&temp_dir.path().join("none.json"), &FactoryCatalog::new());
        assert!(matches!(result, Err(TeamError::Config { .. })));
    }
}
