//! Built-in demo providers.
//!
//! `team.local` keeps a project to itself and refuses linked resources;
//! `team.mirror` accepts them. Both record their configuration in the
//! project's persistent properties so it is visible between runs.

use std::path::Path;
use team_core::{
    FactoryCatalog, Project, ProviderDescriptor, ProviderRegistry, RepositoryProvider, Result,
    TeamError,
};
use tracing::{debug, info};

pub const LOCAL_ID: &str = "team.local";
pub const MIRROR_ID: &str = "team.mirror";

/// Persistent property set while a demo provider is configured.
pub const CONFIGURED_BY_KEY: &str = "team.demo:configured-by";

struct DemoProvider {
    id: String,
    handles_links: bool,
}

impl RepositoryProvider for DemoProvider {
    fn configure_project(&self, project: &Project) -> Result<()> {
        project.set_persistent_property(CONFIGURED_BY_KEY, Some(self.id.as_str()))?;
        info!("{} configured {}", self.id, project.name());
        Ok(())
    }

    fn deconfigure(&self, project: &Project) -> Result<()> {
        project.set_persistent_property(CONFIGURED_BY_KEY, None)?;
        debug!("{} released {}", self.id, project.name());
        Ok(())
    }

    fn can_handle_linked_resources(&self) -> bool {
        self.handles_links
    }
}

/// Factories for the built-in providers, keyed by factory name. The
/// instances carry the id they were registered under.
pub fn catalog() -> FactoryCatalog {
    let mut catalog = FactoryCatalog::new();
    catalog.insert(LOCAL_ID, |id: &str| -> Result<Box<dyn RepositoryProvider>> {
        Ok(Box::new(DemoProvider {
            id: id.to_string(),
            handles_links: false,
        }))
    });
    catalog.insert(MIRROR_ID, |id: &str| -> Result<Box<dyn RepositoryProvider>> {
        Ok(Box::new(DemoProvider {
            id: id.to_string(),
            handles_links: true,
        }))
    });
    catalog
}

/// Registry of the built-in providers, or of the entries in `manifest`
/// when one is given.
pub fn registry(manifest: Option<&Path>) -> Result<ProviderRegistry> {
    let catalog = catalog();
    let builder = ProviderRegistry::builder();
    match manifest {
        Some(path) => builder.load_manifest(path, &catalog)?.build(),
        None => builder
            .register_descriptor(descriptor(&catalog, LOCAL_ID, "Local")?)
            .register_descriptor(descriptor(&catalog, MIRROR_ID, "Mirror")?)
            .build(),
    }
}

fn descriptor(catalog: &FactoryCatalog, id: &str, name: &str) -> Result<ProviderDescriptor> {
    let factory = catalog.get(id).ok_or_else(|| TeamError::Config {
        message: format!("No built-in factory for {id}"),
    })?;
    Ok(ProviderDescriptor::new(id, factory).with_name(name))
}
