use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::event::EventBus;
use crate::kernel::error::HandlerResult;
use crate::plugin_system::args::ParamDecl;
use crate::plugin_system::command::{CommandContext, CommandResponse};
use crate::plugin_system::context::RegistrationContext;
use crate::plugin_system::dependency::{CompatibilityGate, HostCapabilities};
use crate::plugin_system::loader::PluginLoader;
use crate::plugin_system::task::Schedule;
use crate::plugin_system::traits::{Plugin, PluginTable};
use crate::scheduler::{InMemoryScheduler, TaskScheduler};
use crate::storage::config::{ConfigData, MemoryPluginConfigStore, PluginConfigStore};

/// Shared observations of the [`Notifier`] test plugin
#[derive(Debug, Default, Clone)]
pub struct NotifierProbe {
    pub refreshes: Arc<AtomicUsize>,
    pub setup_tokens: Arc<Mutex<Vec<Option<String>>>>,
    pub config_changes: Arc<Mutex<Vec<ConfigData>>>,
}

/// Two listeners, four commands, one task and both hooks
#[derive(Default)]
pub struct Notifier {
    pub probe: NotifierProbe,
}

impl Plugin for Notifier {
    fn name(&self) -> &'static str {
        "notifier"
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        ctx.on_event(["DownloadCompleted"], 50, |_, _| async { Ok(()) });
        ctx.on_event(["SubMedia", "DeleteSubMedia"], 100, |_, _| async { Ok(()) });

        ctx.command(
            "greet",
            "Greet someone",
            &[
                ParamDecl::context("ctx"),
                ParamDecl::typed::<String>("who"),
                ParamDecl::typed::<i64>("times").with_default(1),
            ],
            |ctx: CommandContext, args| async move {
                let who = args.get("who").and_then(Value::as_str).unwrap_or_default().to_string();
                let times = args.get("times").and_then(Value::as_i64).unwrap_or_default();
                Ok(CommandResponse::ok(format!("{}: hello {} x{}", ctx.uid, who, times)))
            },
        );
        ctx.command("fail", "Always fails", &[], |_, _| async { Err("boom".into()) });
        ctx.command("explode", "Always panics", &[], |_, _| async { explode() });

        let refreshes = self.probe.refreshes.clone();
        ctx.command("refresh", "Refresh libraries", &[], move |_, _| {
            let refreshes = refreshes.clone();
            async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(CommandResponse::ok("refreshed"))
            }
        })
        .run_in_background(true);

        ctx.task("poll", "Poll download clients", Schedule::every(30, 0), || async { Ok(()) });

        let setup_tokens = self.probe.setup_tokens.clone();
        ctx.after_setup(move |config| {
            let setup_tokens = setup_tokens.clone();
            async move {
                setup_tokens.lock().unwrap().push(config.get::<String>("token"));
                Ok(())
            }
        });
        let config_changes = self.probe.config_changes.clone();
        ctx.on_config_changed(move |config| {
            let config_changes = config_changes.clone();
            async move {
                config_changes.lock().unwrap().push(config);
                Ok(())
            }
        });
        Ok(())
    }
}

fn explode() -> HandlerResult<CommandResponse> {
    panic!("command exploded")
}

/// Declares a listener, then reports failure
pub struct Broken;

impl Plugin for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        ctx.on_event(["SubMedia"], 100, |_, _| async { Ok(()) });
        Err("cannot start".into())
    }
}

/// Declares a listener and a task, then panics
pub struct Panicky;

impl Plugin for Panicky {
    fn name(&self) -> &'static str {
        "panicky"
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        ctx.on_event(["SubMedia"], 100, |_, _| async { Ok(()) });
        ctx.task("tick", "Tick", Schedule::every(1, 0), || async { Ok(()) });
        panic!("exploded during registration")
    }
}

/// Registers fine, but its after-setup hook fails
pub struct SetupFails;

impl Plugin for SetupFails {
    fn name(&self) -> &'static str {
        "setup-fails"
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        ctx.on_event(["DownloadCompleted"], 100, |_, _| async { Ok(()) });
        ctx.task("tick", "Tick", Schedule::cron("*/5 * * * *"), || async { Ok(()) });
        ctx.after_setup(|_config| async { Err("missing credentials".into()) });
        Ok(())
    }
}

/// One listener and one task, owned by "other"
pub struct Bystander;

impl Plugin for Bystander {
    fn name(&self) -> &'static str {
        "other"
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        ctx.on_event(["DownloadCompleted"], 10, |_, _| async { Ok(()) });
        ctx.task("t", "Other plugin task", Schedule::every(60, 0), || async { Ok(()) });
        Ok(())
    }
}

/// Registers once; every later registration fails
#[derive(Default)]
pub struct Flaky {
    pub registrations: Arc<AtomicUsize>,
}

impl Plugin for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        ctx.on_event(["DownloadCompleted"], 100, |_, _| async { Ok(()) });
        ctx.task("tick", "Tick", Schedule::every(60, 0), || async { Ok(()) });
        if self.registrations.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err("refusing to register twice".into());
        }
        Ok(())
    }
}

/// A plugin root in a temp dir with a loader wired to a fresh bus and scheduler
pub struct Harness {
    pub dir: TempDir,
    pub bus: Arc<EventBus>,
    pub scheduler: Arc<InMemoryScheduler>,
    pub store: Arc<MemoryPluginConfigStore>,
    pub loader: Arc<PluginLoader>,
}

impl Harness {
    pub fn new(table: PluginTable) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("plugins")).unwrap();

        let store = Arc::new(MemoryPluginConfigStore::new());
        let store_dyn: Arc<dyn PluginConfigStore> = store.clone();
        let bus = Arc::new(EventBus::with_workers(2).with_config_store(store_dyn.clone()));
        let scheduler = Arc::new(InMemoryScheduler::new());
        let scheduler_dyn: Arc<dyn TaskScheduler> = scheduler.clone();
        let gate = CompatibilityGate::new(HostCapabilities::new("1.5.0", vec!["emby".to_string()]));
        let loader = Arc::new(PluginLoader::new(
            dir.path().join("plugins"),
            table,
            gate,
            bus.clone(),
            scheduler_dyn,
            store_dyn,
        ));
        Self {
            dir,
            bus,
            scheduler,
            store,
            loader,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("plugins")
    }

    /// Create `<root>/<folder>/manifest.json`
    pub fn plugin_folder(&self, folder: &str, manifest: Value) -> PathBuf {
        let path = self.root().join(folder);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("manifest.json"), manifest.to_string()).unwrap();
        path
    }
}

pub fn manifest(name: &str) -> Value {
    json!({
        "name": name,
        "title": format!("{} plugin", name),
        "version": "1.0",
        "author": "tests",
        "dependencies": {"appVersion": ">=1.0.0"}
    })
}

/// Write a zip archive holding `entries` as (path, content) pairs
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}
