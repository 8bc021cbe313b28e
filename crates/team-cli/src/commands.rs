//! Subcommand implementations. Each returns the JSON document that `main`
//! prints.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use team_core::store::atomic_read_json;
use team_core::{
    MappingOptions, Project, PropertyStore, ProviderMapping, ProviderRegistry, Workspace,
    WorkspaceManifest,
};
use tracing::debug;

/// Everything a subcommand needs: the workspace from the manifest, backed by
/// the property store, and a mapping over the provider registry.
pub struct Session {
    pub mapping: ProviderMapping,
}

impl Session {
    pub fn load(
        manifest_path: &Path,
        store: Arc<dyn PropertyStore>,
        registry: ProviderRegistry,
        options: MappingOptions,
    ) -> Result<Self> {
        let manifest: WorkspaceManifest = atomic_read_json(manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?
            .with_context(|| format!("Workspace manifest not found: {}", manifest_path.display()))?;
        debug!(
            "Loaded workspace manifest with {} projects",
            manifest.projects.len()
        );
        let workspace = Arc::new(
            Workspace::from_manifest(manifest, store).context("Failed to build workspace")?,
        );
        Ok(Self {
            mapping: ProviderMapping::with_options(Arc::new(registry), workspace, options),
        })
    }

    fn project(&self, name: &str) -> Result<Project> {
        match self.mapping.workspace().project(name) {
            Some(project) => Ok(project),
            None => bail!("No project named {name} in the workspace"),
        }
    }
}

pub fn providers(session: &Session) -> Value {
    let registry = session.mapping.registry();
    let natures = session.mapping.workspace().natures();
    let providers: Vec<Value> = session
        .mapping
        .all_provider_type_ids()
        .into_iter()
        .map(|id| {
            let name = registry.descriptor(&id).map(|d| d.name().to_string());
            json!({
                "id": id,
                "name": name,
                "registered": registry.contains(&id),
                "legacy_nature": natures.is_team_nature(&id),
            })
        })
        .collect();
    json!({ "providers": providers })
}

pub fn status(session: &Session, project: Option<&str>) -> Result<Value> {
    let projects = match project {
        Some(name) => vec![session.project(name)?],
        None => session.mapping.workspace().projects(),
    };
    let entries: Vec<Value> = projects
        .iter()
        .map(|project| project_status(&session.mapping, project))
        .collect();
    Ok(json!({ "projects": entries }))
}

fn project_status(mapping: &ProviderMapping, project: &Project) -> Value {
    let provider = mapping.get_provider(project);
    json!({
        "name": project.name(),
        "open": project.is_open(),
        "shared": mapping.is_shared(project),
        "provider": provider.as_ref().map(|p| p.id()),
        "state": provider.as_ref().map(|p| p.state()),
    })
}

pub fn map(session: &Session, project: &str, id: &str) -> Result<Value> {
    let project = session.project(project)?;
    session
        .mapping
        .map(&project, id)
        .with_context(|| format!("Failed to map {} to {}", project.name(), id))?;
    Ok(project_status(&session.mapping, &project))
}

pub fn unmap(session: &Session, project: &str) -> Result<Value> {
    let project = session.project(project)?;
    session
        .mapping
        .unmap(&project)
        .with_context(|| format!("Failed to unmap {}", project.name()))?;
    Ok(project_status(&session.mapping, &project))
}
