//! # Mediabot Core
//!
//! Plugin runtime of the mediabot automation host: plugin discovery and
//! compatibility checks, the registration surface plugins declare their
//! listeners, commands and tasks through, the ordered event bus, and
//! plugin install/uninstall.
pub mod event;
pub mod kernel;
pub mod plugin_system;
pub mod scheduler;
pub mod storage;
pub mod utils;

pub use event::{Event, EventBus, EventListener, EventType, ListenerContext};
pub use kernel::error::{BoxError, Error as KernelError, HandlerResult};
pub use kernel::{Application, HostSettings, KernelComponent};
pub use plugin_system::{
    ArgType, CommandContext, CommandResponse, ParamDecl, Plugin, PluginManager, PluginManifest, PluginTable,
    RegistrationContext, Schedule,
};
pub use scheduler::TaskScheduler;
pub use storage::{ConfigData, PluginConfigStore};
