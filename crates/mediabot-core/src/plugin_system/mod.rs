//! # Mediabot Core Plugin System
//!
//! Everything needed to turn a folder under the plugin root into a running
//! plugin, and to take it away again.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`version`]**: Encodes dotted versions into comparable integers.
//! - **[`dependency`]**: The [`CompatibilityGate`] that checks a manifest's
//!   `dependencies` against the running host.
//! - **[`manifest`]**: The `manifest.json` model ([`PluginManifest`]).
//! - **[`args`]**: Argument schemas inferred from command parameter
//!   declarations, and validation of raw arguments against them.
//! - **[`context`]**: The [`RegistrationContext`] a plugin declares its
//!   listeners, commands, tasks and hooks through.
//! - **[`traits`]**: The [`Plugin`] entry point and the [`PluginTable`] of
//!   implementations compiled into the host.
//! - **[`registry`]**: [`PluginMeta`] entries keyed by plugin name.
//! - **[`loader`]**: Discovery, loading, installation and uninstallation.
//! - **[`manager`]**: The [`PluginManager`] component used by the host,
//!   including command invocation and config updates.
//!
//! A plugin is only ever visible in the registry once its registration and
//! its `after_setup` hook have both succeeded.
pub mod args;
pub mod command;
pub mod context;
pub mod dependency;
pub mod error;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod task;
pub mod traits;
pub mod version;

pub use args::{ArgEnum, ArgSchema, ArgSchemaMap, ArgType, EnumChoice, ParamAnnotation, ParamDecl, ParsedArgs};
pub use command::{CommandContext, CommandResponse, PluginCommand};
pub use context::RegistrationContext;
pub use dependency::{CompatibilityGate, HostCapabilities};
pub use error::PluginSystemError;
pub use loader::{LoadOutcome, PluginLoader, PluginState};
pub use manager::{DefaultPluginManager, PluginManager};
pub use manifest::{ConfigField, FieldType, PluginManifest};
pub use registry::{PluginMeta, PluginRegistry, PluginSummary};
pub use task::{PluginTask, Schedule};
pub use traits::{Plugin, PluginTable};
pub use version::Version;

#[cfg(test)]
mod tests;
