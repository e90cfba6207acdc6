use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::event::bus::{panic_message, EventBus};
use crate::kernel::component::KernelComponent;
use crate::kernel::error::{Error, Result};
use crate::plugin_system::command::{CommandContext, CommandResponse, PluginCommand};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::{run_hook, LoadOutcome, PluginLoader};
use crate::plugin_system::registry::{PluginMeta, PluginSummary};
use crate::storage::config::{ConfigData, PluginConfigStore};

/// Message returned for commands handed to the worker pool
pub const SUBMITTED: &str = "submitted";

/// Host-facing operations on loaded plugins
#[async_trait]
pub trait PluginManager: KernelComponent {
    /// Discover and load every plugin under the plugin root
    async fn load_plugins(&self) -> Result<Vec<Arc<PluginMeta>>>;

    async fn get_plugin(&self, name: &str) -> Option<Arc<PluginMeta>>;

    /// All loaded plugins, sorted by name
    async fn get_plugins(&self) -> Vec<Arc<PluginMeta>>;

    /// Install from a URL or zip archive and load the result
    async fn install_plugin(&self, source: &str) -> Result<Option<Arc<PluginMeta>>>;

    async fn uninstall_plugin(&self, name: &str, delete_config: bool) -> Result<()>;

    /// Validate arguments and invoke a plugin command
    async fn run_command(
        &self,
        plugin: &str,
        command: &str,
        ctx: CommandContext,
        raw_args: &Map<String, Value>,
    ) -> Result<CommandResponse>;

    /// Persist a plugin's config and notify the plugin
    async fn update_plugin_config(&self, name: &str, config: ConfigData) -> Result<()>;
}

/// Default implementation of plugin manager
pub struct DefaultPluginManager {
    loader: Arc<PluginLoader>,
    bus: Arc<EventBus>,
    config_store: Arc<dyn PluginConfigStore>,
}

impl DefaultPluginManager {
    pub fn new(loader: Arc<PluginLoader>, bus: Arc<EventBus>, config_store: Arc<dyn PluginConfigStore>) -> Self {
        Self {
            loader,
            bus,
            config_store,
        }
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    pub async fn summaries(&self) -> Vec<PluginSummary> {
        self.get_plugins().await.iter().map(|m| m.summary()).collect()
    }

    /// Per-folder outcome of the loads attempted so far
    pub async fn load_report(&self) -> Vec<LoadOutcome> {
        self.loader.report().await
    }

    async fn require(&self, name: &str) -> Result<Arc<PluginMeta>> {
        let registry = self.loader.registry();
        let meta = registry.read().await.require(name)?;
        Ok(meta)
    }
}

async fn invoke_guarded(
    command: Arc<PluginCommand>,
    ctx: CommandContext,
    args: Map<String, Value>,
) -> std::result::Result<CommandResponse, String> {
    let invocation = {
        let command = command.clone();
        async move { command.invoke(ctx, args).await }
    };
    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

impl Debug for DefaultPluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPluginManager")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelComponent for DefaultPluginManager {
    fn name(&self) -> &'static str {
        "DefaultPluginManager"
    }

    async fn initialize(&self) -> Result<()> {
        let root = self.loader.plugin_root();
        if !root.is_dir() {
            log::info!("Creating plugin directory {}", root.display());
            std::fs::create_dir_all(root).map_err(|e| Error::io(e, "create_dir_all", root.to_path_buf()))?;
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let loaded = self.load_plugins().await?;
        log::info!("{} plugin(s) active", loaded.len());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        log::debug!("Plugin manager stopped");
        Ok(())
    }
}

#[async_trait]
impl PluginManager for DefaultPluginManager {
    async fn load_plugins(&self) -> Result<Vec<Arc<PluginMeta>>> {
        Ok(self.loader.load_all().await?)
    }

    async fn get_plugin(&self, name: &str) -> Option<Arc<PluginMeta>> {
        self.loader.registry().read().await.get(name)
    }

    async fn get_plugins(&self) -> Vec<Arc<PluginMeta>> {
        self.loader.registry().read().await.all()
    }

    async fn install_plugin(&self, source: &str) -> Result<Option<Arc<PluginMeta>>> {
        let folder = self.loader.install(source).await?;
        Ok(self.loader.load_one(&folder).await)
    }

    async fn uninstall_plugin(&self, name: &str, delete_config: bool) -> Result<()> {
        Ok(self.loader.uninstall(name, delete_config).await?)
    }

    async fn run_command(
        &self,
        plugin: &str,
        command: &str,
        ctx: CommandContext,
        raw_args: &Map<String, Value>,
    ) -> Result<CommandResponse> {
        let meta = self.require(plugin).await?;
        let cmd = meta.command(command).ok_or_else(|| PluginSystemError::CommandNotFound {
            plugin_id: plugin.to_string(),
            command: command.to_string(),
        })?;
        let args = cmd.parse_args(raw_args)?;

        if cmd.runs_in_background() {
            let (plugin, command) = (plugin.to_string(), command.to_string());
            self.bus.spawn_background(async move {
                match invoke_guarded(cmd, ctx, args).await {
                    Ok(response) if !response.success => {
                        log::warn!("Command {}.{} reported failure: {}", plugin, command, response.message)
                    }
                    Ok(_) => {}
                    Err(message) => log::error!("Command {}.{} failed: {}", plugin, command, message),
                }
            })?;
            return Ok(CommandResponse::ok(SUBMITTED));
        }

        match invoke_guarded(cmd, ctx, args).await {
            Ok(response) => Ok(response),
            Err(message) => {
                log::error!("Command {}.{} failed: {}", plugin, command, message);
                Ok(CommandResponse::failed(message))
            }
        }
    }

    async fn update_plugin_config(&self, name: &str, config: ConfigData) -> Result<()> {
        self.config_store.set(name, config.clone())?;
        self.config_store.persist()?;
        log::info!("Saved config of plugin {}", name);

        let Some(meta) = self.get_plugin(name).await else {
            log::debug!("Plugin {} is not loaded; no config hook to run", name);
            return Ok(());
        };
        if let Some(hook) = &meta.on_config_changed {
            if let Err(e) = run_hook(name, "on_config_changed", hook, config).await {
                log::error!("{}", e);
            }
        }
        Ok(())
    }
}
