//! # Mediabot Core Kernel Errors
//!
//! Defines the top-level error type of the runtime core.
//!
//! [`Error`] wraps the typed errors of each subsystem (plugin system, event
//! bus, storage, scheduler) and adds kernel lifecycle failures. Handler code
//! supplied by plugins reports failures through [`HandlerResult`], which the
//! core converts into logged or caller-visible errors at its boundaries.
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::event::error::EventSystemError;
use crate::plugin_system::error::PluginSystemError;
use crate::scheduler::SchedulerError;
use crate::storage::error::StorageSystemError;

/// Boxed error returned by plugin-supplied handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for listener, command, task and hook callables
pub type HandlerResult<T = ()> = StdResult<T, BoxError>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Specific, typed event system error
    #[error("Event system error: {0}")]
    EventSystem(#[from] EventSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("Kernel lifecycle error during {phase:?}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

/// Represents a specific phase in the kernel's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Bootstrap")]
    Bootstrap,
    #[error("Initialize")]
    Initialize,
    #[error("Start")]
    Start,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// Wrap an I/O failure with the operation and path it happened on
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::io(source, operation, path))
    }
}
