use std::fs;
use std::sync::Arc;

use serde_json::json;

use super::support::{manifest, write_zip, Broken, Bystander, Flaky, Harness, Notifier, NotifierProbe, Panicky, SetupFails};
use crate::event::EventBus;
use crate::plugin_system::dependency::CompatibilityGate;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::{PluginLoader, PluginState};
use crate::plugin_system::traits::PluginTable;
use crate::scheduler::{InMemoryScheduler, TaskScheduler};
use crate::storage::config::{ConfigData, MemoryPluginConfigStore, PluginConfigStore};

fn notifier_table() -> (PluginTable, NotifierProbe) {
    let probe = NotifierProbe::default();
    let table = PluginTable::new().with(Notifier { probe: probe.clone() });
    (table, probe)
}

#[tokio::test]
async fn test_discover_skips_reserved_and_staging_folders() {
    let harness = Harness::new(PluginTable::new());
    for folder in ["b_plugin", "a_plugin", "__pycache__", ".install-abc123"] {
        fs::create_dir_all(harness.root().join(folder)).unwrap();
    }
    fs::write(harness.root().join("readme.txt"), "not a plugin").unwrap();

    let found = harness.loader.discover().await.unwrap();
    assert_eq!(found, vec![harness.root().join("a_plugin"), harness.root().join("b_plugin")]);
}

#[tokio::test]
async fn test_discover_fails_without_plugin_root() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler: Arc<dyn TaskScheduler> = Arc::new(InMemoryScheduler::new());
    let loader = PluginLoader::new(
        dir.path().join("missing"),
        PluginTable::new(),
        CompatibilityGate::default(),
        Arc::new(EventBus::new()),
        scheduler,
        Arc::new(MemoryPluginConfigStore::new()),
    );
    assert!(matches!(loader.discover().await, Err(PluginSystemError::LoadingError { .. })));
    assert!(loader.load_all().await.is_err());
}

#[tokio::test]
async fn test_load_all_keeps_going_past_bad_plugins() {
    let (table, _probe) = notifier_table();
    let harness = Harness::new(table);

    let good = harness.plugin_folder("notifier", manifest("notifier"));
    let mut future = manifest("future");
    future["dependencies"] = json!({"appVersion": ">=99.0"});
    let unsupported = harness.plugin_folder("future", future);
    let mut plex = manifest("plex_only");
    plex["dependencies"] = json!({"mediaServer": "plex"});
    let wrong_server = harness.plugin_folder("plex_only", plex);
    let unknown = harness.plugin_folder("ghost", manifest("ghost"));
    let empty = harness.root().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let loaded = harness.loader.load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name(), "notifier");
    assert_eq!(harness.loader.registry().read().await.names(), vec!["notifier"]);

    assert_eq!(harness.loader.state_of(&good).await, Some(PluginState::Active));
    for folder in [&unsupported, &wrong_server, &unknown, &empty] {
        assert_eq!(harness.loader.state_of(folder).await, Some(PluginState::Rejected), "{}", folder.display());
    }

    let report = harness.loader.report().await;
    assert_eq!(report.len(), 5);
    let empty_outcome = report.iter().find(|o| o.folder == empty).unwrap();
    assert_eq!(empty_outcome.plugin, None);
    assert!(empty_outcome.error.is_some());
    let future_outcome = report.iter().find(|o| o.folder == unsupported).unwrap();
    assert_eq!(future_outcome.plugin.as_deref(), Some("future"));
    assert!(future_outcome.error.as_deref().unwrap().contains(">=99.0"));
}

#[tokio::test]
async fn test_active_plugin_publishes_listeners_and_tasks() {
    let (table, probe) = notifier_table();
    let harness = Harness::new(table);
    let mut config = ConfigData::new();
    config.set("token", "secret").unwrap();
    harness.store.set("notifier", config).unwrap();
    let folder = harness.plugin_folder("notifier", manifest("notifier"));

    let meta = harness.loader.load_one(&folder).await.unwrap();
    assert_eq!(meta.listeners().len(), 2);
    assert_eq!(meta.commands().len(), 4);
    assert_eq!(meta.module(), "notifier");

    assert_eq!(harness.bus.listener_count().await, 2);
    assert_eq!(harness.bus.listeners_owned_by("notifier").await.len(), 2);
    let tasks = harness.scheduler.get_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].owner.as_deref(), Some("notifier"));

    assert_eq!(
        *probe.setup_tokens.lock().unwrap(),
        vec![Some("secret".to_string())]
    );
}

#[tokio::test]
async fn test_failed_registration_leaves_nothing_behind() {
    let table = PluginTable::new().with(Broken).with(Panicky).with(SetupFails);
    let harness = Harness::new(table);
    let folders = [
        harness.plugin_folder("broken", manifest("broken")),
        harness.plugin_folder("panicky", manifest("panicky")),
        harness.plugin_folder("setup", manifest("setup-fails")),
    ];

    let loaded = harness.loader.load_all().await.unwrap();
    assert!(loaded.is_empty());
    assert!(harness.loader.registry().read().await.is_empty());
    assert_eq!(harness.bus.listener_count().await, 0);
    assert!(harness.scheduler.get_tasks().await.is_empty());

    for folder in &folders {
        assert_eq!(harness.loader.state_of(folder).await, Some(PluginState::Rejected));
    }
    let report = harness.loader.report().await;
    let messages: Vec<String> = report.iter().filter_map(|o| o.error.clone()).collect();
    assert!(messages.iter().any(|m| m.contains("cannot start")));
    assert!(messages.iter().any(|m| m.contains("exploded during registration")));
    assert!(messages.iter().any(|m| m.contains("missing credentials")));
}

#[tokio::test]
async fn test_reloading_replaces_previous_instance() {
    let (table, probe) = notifier_table();
    let harness = Harness::new(table);
    let folder = harness.plugin_folder("notifier", manifest("notifier"));

    let first = harness.loader.load_one(&folder).await.unwrap();
    let second = harness.loader.load_one(&folder).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    assert_eq!(harness.loader.registry().read().await.len(), 1);
    assert_eq!(harness.bus.listener_count().await, 2);
    assert_eq!(harness.scheduler.get_tasks().await.len(), 1);
    assert_eq!(probe.setup_tokens.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_reload_keeps_loaded_instance() {
    let harness = Harness::new(PluginTable::new().with(Flaky::default()));
    let folder = harness.plugin_folder("flaky", manifest("flaky"));

    let first = harness.loader.load_one(&folder).await.unwrap();
    assert!(harness.loader.load_one(&folder).await.is_none());

    let active = harness.loader.registry().read().await.get("flaky").unwrap();
    assert!(Arc::ptr_eq(&first, &active));
    assert_eq!(harness.bus.listeners_owned_by("flaky").await.len(), 1);
    assert_eq!(harness.scheduler.get_tasks().await.len(), 1);
    assert_eq!(harness.loader.state_of(&folder).await, Some(PluginState::Rejected));
}

#[tokio::test]
async fn test_uninstall_removes_only_what_the_plugin_owns() {
    let probe = NotifierProbe::default();
    let table = PluginTable::new().with(Notifier { probe }).with(Bystander);
    let harness = Harness::new(table);
    let mut config = ConfigData::new();
    config.set("token", "secret").unwrap();
    harness.store.set("notifier", config.clone()).unwrap();
    harness.store.set("other", config).unwrap();
    let folder = harness.plugin_folder("notifier", manifest("notifier"));
    let other_folder = harness.plugin_folder("other", manifest("other"));
    harness.loader.load_one(&folder).await.unwrap();
    harness.loader.load_one(&other_folder).await.unwrap();
    assert_eq!(harness.bus.listener_count().await, 3);
    assert_eq!(harness.scheduler.get_tasks().await.len(), 2);

    harness.loader.uninstall("notifier", true).await.unwrap();

    assert!(!folder.exists());
    assert!(other_folder.exists());
    assert!(harness.bus.listeners_owned_by("notifier").await.is_empty());
    assert_eq!(harness.bus.listeners_owned_by("other").await.len(), 1);
    assert_eq!(harness.bus.listener_count().await, 1);
    let remaining: Vec<(String, Option<String>)> = harness
        .scheduler
        .get_tasks()
        .await
        .into_iter()
        .map(|info| (info.name, info.owner))
        .collect();
    assert_eq!(remaining, vec![("t".to_string(), Some("other".to_string()))]);
    assert!(harness.store.get("notifier").unwrap().is_empty());
    assert!(!harness.store.get("other").unwrap().is_empty());
    assert!(harness.loader.registry().read().await.get("other").is_some());
    assert!(matches!(
        harness.loader.registry().read().await.require("notifier"),
        Err(PluginSystemError::NotFound { .. })
    ));
    assert_eq!(harness.loader.state_of(&folder).await, Some(PluginState::Removed));

    assert!(matches!(
        harness.loader.uninstall("notifier", true).await,
        Err(PluginSystemError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_uninstall_can_keep_config() {
    let (table, _probe) = notifier_table();
    let harness = Harness::new(table);
    let mut config = ConfigData::new();
    config.set("token", "secret").unwrap();
    harness.store.set("notifier", config).unwrap();
    let folder = harness.plugin_folder("notifier", manifest("notifier"));
    harness.loader.load_one(&folder).await.unwrap();

    harness.loader.uninstall("notifier", false).await.unwrap();

    assert!(!folder.exists());
    assert_eq!(
        harness.store.get("notifier").unwrap().get::<String>("token"),
        Some("secret".to_string())
    );
}

#[tokio::test]
async fn test_install_nested_archive() {
    let (table, _probe) = notifier_table();
    let harness = Harness::new(table);
    let archive = harness.dir.path().join("notifier.zip");
    let manifest_text = manifest("notifier").to_string();
    write_zip(
        &archive,
        &[
            ("notifier-main/manifest.json", manifest_text.as_str()),
            ("notifier-main/assets/readme.txt", "docs"),
        ],
    );

    let target = harness.loader.install(archive.to_str().unwrap()).await.unwrap();

    assert_eq!(target, harness.root().join("notifier-main"));
    assert!(target.join("manifest.json").is_file());
    assert_eq!(fs::read_to_string(target.join("assets/readme.txt")).unwrap(), "docs");
    assert!(archive.is_file());
    assert_eq!(fs::read_dir(harness.root()).unwrap().count(), 1);

    let meta = harness.loader.load_one(&target).await.unwrap();
    assert_eq!(meta.module(), "notifier-main");
}

#[tokio::test]
async fn test_install_flat_archive_replaces_existing_folder() {
    let harness = Harness::new(PluginTable::new());
    let stale = harness.plugin_folder("notifier", manifest("notifier"));
    fs::write(stale.join("stale.txt"), "old").unwrap();

    let archive = harness.dir.path().join("flat.zip");
    let manifest_text = manifest("notifier").to_string();
    write_zip(&archive, &[("manifest.json", manifest_text.as_str()), ("icon.png", "png")]);

    let target = harness.loader.install(archive.to_str().unwrap()).await.unwrap();

    assert_eq!(target, harness.root().join("notifier"));
    assert!(target.join("icon.png").is_file());
    assert!(!target.join("stale.txt").exists());
    assert_eq!(fs::read_dir(harness.root()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_install_rejects_bad_archives() {
    let harness = Harness::new(PluginTable::new());
    let dir = harness.dir.path();

    let missing = dir.join("missing.zip");
    let not_zip = dir.join("not.zip");
    fs::write(&not_zip, "plain text").unwrap();
    let no_manifest = dir.join("empty.zip");
    write_zip(&no_manifest, &[("plugin/readme.txt", "no manifest here")]);
    let bad_manifest = dir.join("bad.zip");
    write_zip(&bad_manifest, &[("manifest.json", "{\"title\": \"nameless\"}")]);

    for archive in [&missing, &not_zip, &no_manifest] {
        let err = harness.loader.install(archive.to_str().unwrap()).await.unwrap_err();
        assert!(
            matches!(err, PluginSystemError::InstallError { .. }),
            "{}: {:?}",
            archive.display(),
            err
        );
    }
    let err = harness.loader.install(bad_manifest.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, PluginSystemError::ManifestError { .. }));

    assert_eq!(fs::read_dir(harness.root()).unwrap().count(), 0);
}
