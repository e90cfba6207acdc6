use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::event::listener::{EventListener, PluginOwner};
use crate::kernel::error::HandlerResult;
use crate::plugin_system::command::PluginCommand;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::PluginManifest;
use crate::plugin_system::task::PluginTask;
use crate::storage::config::ConfigData;

/// Type-erased plugin lifecycle hook; receives the plugin's current config
pub type HookFn = dyn Fn(ConfigData) -> BoxFuture<'static, HandlerResult> + Send + Sync;

pub(crate) fn erase_hook<F, Fut>(hook: F) -> Arc<HookFn>
where
    F: Fn(ConfigData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |config: ConfigData| -> BoxFuture<'static, HandlerResult> { Box::pin(hook(config)) })
}

/// Everything the runtime knows about one loaded plugin
pub struct PluginMeta {
    pub(crate) name: String,
    pub(crate) module: String,
    pub(crate) manifest: PluginManifest,
    pub(crate) folder: PathBuf,
    pub(crate) listeners: Vec<Arc<EventListener>>,
    pub(crate) commands: Vec<Arc<PluginCommand>>,
    pub(crate) tasks: Vec<Arc<PluginTask>>,
    pub(crate) on_config_changed: Option<Arc<HookFn>>,
    pub(crate) after_setup: Option<Arc<HookFn>>,
}

impl PluginMeta {
    pub(crate) fn new(manifest: PluginManifest, folder: &Path) -> Self {
        let module = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| manifest.name.clone());
        Self {
            name: manifest.name.clone(),
            module,
            manifest,
            folder: folder.to_path_buf(),
            listeners: Vec::new(),
            commands: Vec::new(),
            tasks: Vec::new(),
            on_config_changed: None,
            after_setup: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Folder name the plugin was loaded from
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn title(&self) -> &str {
        self.manifest.display_title()
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn owner(&self) -> PluginOwner {
        PluginOwner {
            name: self.name.clone(),
            title: self.title().to_string(),
        }
    }

    pub fn listeners(&self) -> &[Arc<EventListener>] {
        &self.listeners
    }

    pub fn commands(&self) -> &[Arc<PluginCommand>] {
        &self.commands
    }

    pub fn command(&self, name: &str) -> Option<Arc<PluginCommand>> {
        self.commands.iter().find(|c| c.name() == name).cloned()
    }

    pub fn tasks(&self) -> &[Arc<PluginTask>] {
        &self.tasks
    }

    pub fn has_config_hook(&self) -> bool {
        self.on_config_changed.is_some()
    }

    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            title: self.title().to_string(),
            version: self.manifest.version.clone(),
            author: self.manifest.author.clone(),
            folder: self.folder.clone(),
            listeners: self.listeners.len(),
            commands: self.commands.iter().map(|c| c.name().to_string()).collect(),
            tasks: self.tasks.iter().map(|t| t.name().to_string()).collect(),
        }
    }
}

impl fmt::Debug for PluginMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginMeta")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("folder", &self.folder)
            .field("listeners", &self.listeners.len())
            .field("commands", &self.commands)
            .field("tasks", &self.tasks)
            .field("on_config_changed", &self.on_config_changed.is_some())
            .field("after_setup", &self.after_setup.is_some())
            .finish()
    }
}

/// Serializable overview of a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub title: String,
    pub version: String,
    pub author: String,
    pub folder: PathBuf,
    pub listeners: usize,
    pub commands: Vec<String>,
    pub tasks: Vec<String>,
}

/// Loaded plugins keyed by their unique name
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<PluginMeta>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin; a name that is already taken is an error
    pub fn register(&mut self, meta: Arc<PluginMeta>) -> Result<(), PluginSystemError> {
        if self.plugins.contains_key(meta.name()) {
            return Err(PluginSystemError::RegistrationError {
                plugin_id: meta.name().to_string(),
                message: "a plugin with this name is already registered".to_string(),
            });
        }
        self.plugins.insert(meta.name().to_string(), meta);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<PluginMeta>> {
        self.plugins.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<PluginMeta>> {
        self.plugins.get(name).cloned()
    }

    /// Like [`PluginRegistry::get`], but a missing plugin is an error
    pub fn require(&self, name: &str) -> Result<Arc<PluginMeta>, PluginSystemError> {
        self.get(name).ok_or_else(|| PluginSystemError::NotFound {
            plugin_id: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Plugin names, sorted
    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<PluginMeta>> {
        self.plugins.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
