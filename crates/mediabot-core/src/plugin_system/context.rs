use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::event::listener::{EventListener, ListenerContext, ListenerId};
use crate::event::types::Event;
use crate::kernel::error::HandlerResult;
use crate::plugin_system::args::{ParamDecl, ParsedArgs};
use crate::plugin_system::command::{CommandBuilder, CommandContext, CommandResponse, PluginCommand};
use crate::plugin_system::manifest::PluginManifest;
use crate::plugin_system::registry::{erase_hook, PluginMeta};
use crate::plugin_system::task::{PluginTask, Schedule, TaskBuilder};
use crate::storage::config::ConfigData;

/// Collects the listeners, commands, tasks and hooks a plugin declares
/// while its [`Plugin::register`](crate::plugin_system::Plugin::register)
/// runs. Everything added here is stamped with the plugin as its owner.
///
/// Nothing is published to the event bus or scheduler until registration
/// returns successfully.
#[derive(Debug)]
pub struct RegistrationContext {
    meta: PluginMeta,
    commands: Vec<PluginCommand>,
    tasks: Vec<PluginTask>,
}

impl RegistrationContext {
    pub(crate) fn new(meta: PluginMeta) -> Self {
        Self {
            meta,
            commands: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Name of the plugin being registered
    pub fn plugin_name(&self) -> &str {
        self.meta.name()
    }

    pub fn manifest(&self) -> &PluginManifest {
        self.meta.manifest()
    }

    /// Folder the plugin was loaded from, for plugin-local resources
    pub fn folder(&self) -> &Path {
        self.meta.folder()
    }

    /// Subscribe a handler to one or more event types
    pub fn on_event<I, E, F, Fut>(&mut self, event_types: I, order: i32, handler: F) -> ListenerId
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        F: Fn(ListenerContext, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let listener = EventListener::new(event_types, handler).with_order(order);
        self.listener(listener)
    }

    /// Add a prebuilt listener. Listeners without a name get one derived
    /// from the plugin name.
    pub fn listener(&mut self, listener: EventListener) -> ListenerId {
        let default_name = format!("listener-{}", listener.id());
        let mut listener = listener.with_owner(self.meta.owner());
        if listener.name() == default_name {
            let index = self.meta.listeners.len() + 1;
            listener = listener.with_name(format!("{}.listener-{}", self.meta.name(), index));
        }
        let id = listener.id();
        self.meta.listeners.push(Arc::new(listener));
        id
    }

    /// Expose a command. `params` mirrors the handler's parameter list and
    /// becomes the command's argument schema.
    pub fn command<F, Fut>(
        &mut self,
        name: impl Into<String>,
        title: impl Into<String>,
        params: &[ParamDecl],
        handler: F,
    ) -> CommandBuilder<'_>
    where
        F: Fn(CommandContext, ParsedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<CommandResponse>> + Send + 'static,
    {
        let command = PluginCommand::new(name, title, params, handler);
        CommandBuilder::new(self.push_command(command))
    }

    /// Add a prebuilt command. A second command with the same name replaces the first.
    pub fn add_command(&mut self, command: PluginCommand) -> &mut Self {
        self.push_command(command);
        self
    }

    fn push_command(&mut self, command: PluginCommand) -> &mut PluginCommand {
        log::info!("Plugin {} added command: {}", self.meta.title(), command.title());
        let index = match self.commands.iter().position(|c| c.name() == command.name()) {
            Some(index) => {
                log::warn!(
                    "Plugin {} registered command '{}' twice; keeping the last one",
                    self.meta.name(),
                    command.name()
                );
                self.commands[index] = command;
                index
            }
            None => {
                self.commands.push(command);
                self.commands.len() - 1
            }
        };
        &mut self.commands[index]
    }

    /// Declare a periodic task
    pub fn task<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schedule: Schedule,
        job: F,
    ) -> TaskBuilder<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let task = PluginTask::new(name, description, schedule, job);
        TaskBuilder::new(self.push_task(task))
    }

    /// Add a prebuilt task
    pub fn add_task(&mut self, task: PluginTask) -> &mut Self {
        self.push_task(task);
        self
    }

    fn push_task(&mut self, task: PluginTask) -> &mut PluginTask {
        let task = task.with_owner(self.meta.name());
        log::debug!("Plugin {} declared task '{}'", self.meta.name(), task.name());
        self.tasks.push(task);
        let last = self.tasks.len() - 1;
        &mut self.tasks[last]
    }

    /// Called with the new config after the plugin's config is updated
    pub fn on_config_changed<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(ConfigData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.meta.on_config_changed = Some(erase_hook(hook));
        self
    }

    /// Called once with the plugin's config after registration succeeds
    pub fn after_setup<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(ConfigData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.meta.after_setup = Some(erase_hook(hook));
        self
    }

    pub(crate) fn into_meta(self) -> PluginMeta {
        let mut meta = self.meta;
        meta.commands = self.commands.into_iter().map(Arc::new).collect();
        meta.tasks = self.tasks.into_iter().map(Arc::new).collect();
        meta
    }
}
