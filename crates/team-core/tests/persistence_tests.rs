//! Mapping state surviving a restart, and rule wait limits.

mod common;

use common::{create_mapping, marker, memory_store, Behavior, TestRegistry};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use team_core::{
    JsonPropertyStore, MappingOptions, PropertyStore, ProviderMapping, ProviderState, RuleWait,
    SqlitePropertyStore, TeamError, Workspace, WorkspaceManifest,
};
use tempfile::TempDir;

fn restart_round_trip(open_store: impl Fn() -> Arc<dyn PropertyStore>) {
    let providers = TestRegistry::new().provider("git", Behavior::default());

    {
        let (mapping, workspace) = create_mapping(providers.build(), open_store());
        let project = workspace.create_project("alpha").unwrap();
        workspace.create_project("beta").unwrap();
        mapping.map(&project, "git").unwrap();
    }

    let (mapping, workspace) = create_mapping(providers.build(), open_store());
    let alpha = workspace.create_project("alpha").unwrap();
    let beta = workspace.create_project("beta").unwrap();

    assert!(mapping.is_shared(&alpha));
    assert!(!mapping.is_shared(&beta));

    let provider = mapping.get_provider(&alpha).unwrap();
    assert_eq!(provider.id(), "git");
    // Restored providers are bound, not configured again
    assert_eq!(provider.state(), ProviderState::Unconfigured);
    assert_eq!(providers.counters("git").configured(), 1);
    assert_eq!(providers.counters("git").created(), 2);

    mapping.unmap(&alpha).unwrap();
    assert_eq!(providers.counters("git").deconfigured(), 1);
    assert!(marker(&alpha).is_none());
}

#[test]
fn test_sqlite_mapping_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("properties.db");

    restart_round_trip(|| Arc::new(SqlitePropertyStore::open_at(&db_path).unwrap()));
}

#[test]
fn test_json_mapping_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("properties.json");

    restart_round_trip(|| Arc::new(JsonPropertyStore::open(path.clone()).unwrap()));
}

#[test]
fn test_manifest_workspace_reads_existing_markers() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("properties.db");
    let store: Arc<dyn PropertyStore> = Arc::new(SqlitePropertyStore::open_at(&db_path).unwrap());
    store
        .set("alpha", team_core::MappingConfig::PROVIDER_PROP_KEY, Some("git"))
        .unwrap();

    let manifest: WorkspaceManifest = serde_json::from_str(
        r#"{
            "projects": [
                { "name": "alpha" },
                { "name": "beta", "open": false }
            ]
        }"#,
    )
    .unwrap();
    let workspace = Arc::new(Workspace::from_manifest(manifest, store).unwrap());
    let providers = TestRegistry::new().provider("git", Behavior::default());
    let mapping = ProviderMapping::new(Arc::new(providers.build()), workspace.clone());

    let alpha = workspace.project("alpha").unwrap();
    let beta = workspace.project("beta").unwrap();
    assert_eq!(mapping.get_provider(&alpha).unwrap().id(), "git");
    assert!(mapping.get_provider(&beta).is_none());
}

#[test]
fn test_unregistered_marker_resolves_to_none() {
    let store = memory_store();
    store
        .set("alpha", team_core::MappingConfig::PROVIDER_PROP_KEY, Some("cvs"))
        .unwrap();
    let providers = TestRegistry::new().provider("git", Behavior::default());
    let (mapping, workspace) = create_mapping(providers.build(), store);
    let project = workspace.create_project("alpha").unwrap();

    assert!(mapping.is_shared(&project));
    assert!(mapping.get_provider(&project).is_none());

    // Mapping over a dangling marker replaces it
    mapping.map(&project, "git").unwrap();
    assert_eq!(mapping.get_provider(&project).unwrap().id(), "git");
}

#[test]
fn test_delete_project_drops_marker() {
    let store = memory_store();
    let providers = TestRegistry::new().provider("git", Behavior::default());
    let (mapping, workspace) = create_mapping(providers.build(), store.clone());
    let project = workspace.create_project("alpha").unwrap();
    mapping.map(&project, "git").unwrap();

    assert!(workspace.delete_project("alpha").unwrap());
    assert!(store
        .get("alpha", team_core::MappingConfig::PROVIDER_PROP_KEY)
        .unwrap()
        .is_none());

    let recreated = workspace.create_project("alpha").unwrap();
    assert!(!mapping.is_shared(&recreated));
}

#[test]
fn test_map_times_out_waiting_for_rule() {
    let providers = TestRegistry::new().provider("git", Behavior::default());
    let workspace = Arc::new(Workspace::new(memory_store()));
    let options = MappingOptions {
        rule_wait_timeout: Some(Duration::from_millis(100)),
        ..MappingOptions::default()
    };
    let mapping =
        ProviderMapping::with_options(Arc::new(providers.build()), workspace.clone(), options);
    let project = workspace.create_project("alpha").unwrap();

    let (held_tx, held_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holder = {
        let workspace = workspace.clone();
        let project = project.clone();
        thread::spawn(move || {
            let _rule = workspace
                .rules()
                .begin_rule(&project, &RuleWait::default())
                .unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
    };
    held_rx.recv().unwrap();

    let result = mapping.map(&project, "git");
    assert!(matches!(result, Err(TeamError::Timeout(_))));
    assert!(!mapping.is_shared(&project));

    release_tx.send(()).unwrap();
    holder.join().unwrap();

    mapping.map(&project, "git").unwrap();
    assert!(mapping.is_shared(&project));
}
