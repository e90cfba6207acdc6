use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::kernel::error::HandlerResult;
use crate::plugin_system::args::{infer_schema, parse_args, ArgSchemaMap, ParamDecl, ParsedArgs};
use crate::plugin_system::error::PluginSystemError;

/// Type-erased command handler
pub type CommandFn =
    dyn Fn(CommandContext, ParsedArgs) -> BoxFuture<'static, HandlerResult<CommandResponse>> + Send + Sync;

/// Who invoked a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub uid: i64,
}

impl CommandContext {
    pub fn new(uid: i64) -> Self {
        Self { uid }
    }
}

/// Outcome reported back to the invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// An invocable action exposed by a plugin
#[derive(Clone)]
pub struct PluginCommand {
    name: String,
    title: String,
    description: Option<String>,
    icon: Option<String>,
    run_in_background: bool,
    arg_schema: ArgSchemaMap,
    handler: Arc<CommandFn>,
}

impl PluginCommand {
    /// Create a command; `params` mirrors the handler's parameter list and
    /// is turned into the argument schema here, once.
    pub fn new<F, Fut>(name: impl Into<String>, title: impl Into<String>, params: &[ParamDecl], handler: F) -> Self
    where
        F: Fn(CommandContext, ParsedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<CommandResponse>> + Send + 'static,
    {
        let handler: Arc<CommandFn> = Arc::new(
            move |ctx: CommandContext, args: ParsedArgs| -> BoxFuture<'static, HandlerResult<CommandResponse>> {
                Box::pin(handler(ctx, args))
            },
        );
        Self {
            name: name.into(),
            title: title.into(),
            description: None,
            icon: None,
            run_in_background: false,
            arg_schema: infer_schema(params),
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Invocations return immediately and the handler runs on the worker pool
    pub fn in_background(mut self, enabled: bool) -> Self {
        self.run_in_background = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn runs_in_background(&self) -> bool {
        self.run_in_background
    }

    pub fn arg_schema(&self) -> &ArgSchemaMap {
        &self.arg_schema
    }

    /// Validate raw arguments against this command's schema
    pub fn parse_args(&self, raw: &Map<String, Value>) -> Result<ParsedArgs, PluginSystemError> {
        parse_args(raw, &self.arg_schema)
    }

    pub(crate) fn invoke(
        &self,
        ctx: CommandContext,
        args: ParsedArgs,
    ) -> BoxFuture<'static, HandlerResult<CommandResponse>> {
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCommand")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("run_in_background", &self.run_in_background)
            .field("arg_schema", &self.arg_schema)
            .finish_non_exhaustive()
    }
}

impl Serialize for PluginCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PluginCommand", 6)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("title", &self.title)?;
        state.serialize_field("desc", &self.description)?;
        state.serialize_field("icon", &self.icon)?;
        state.serialize_field("runInBackground", &self.run_in_background)?;
        state.serialize_field("argSchema", &self.arg_schema)?;
        state.end()
    }
}

/// Returned by [`RegistrationContext::command`](crate::plugin_system::RegistrationContext::command)
/// to fill in the optional parts of a command
pub struct CommandBuilder<'a> {
    command: &'a mut PluginCommand,
}

impl<'a> CommandBuilder<'a> {
    pub(crate) fn new(command: &'a mut PluginCommand) -> Self {
        Self { command }
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.command.description = Some(description.into());
        self
    }

    pub fn icon(self, icon: impl Into<String>) -> Self {
        self.command.icon = Some(icon.into());
        self
    }

    pub fn run_in_background(self, enabled: bool) -> Self {
        self.command.run_in_background = enabled;
        self
    }
}
