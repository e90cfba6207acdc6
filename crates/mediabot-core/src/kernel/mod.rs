//! # Mediabot Core Kernel
//!
//! Bootstrapping and lifecycle of the runtime core.
//!
//! - [`Application`] builds the config store, event bus, scheduler and
//!   plugin manager from [`HostSettings`] and drives their
//!   initialize/start/stop lifecycle.
//! - [`KernelComponent`] is the lifecycle trait those components share.
//! - [`constants`] holds application-wide constants and defaults.
//! - [`error`] defines the kernel [`Error`] wrapping every subsystem error,
//!   and the [`Result`] alias.
pub mod bootstrap;
pub mod component;
pub mod constants;
pub mod error;
pub mod settings;

pub use bootstrap::Application;
pub use component::KernelComponent;
pub use error::{Error, Result};
pub use settings::HostSettings;

#[cfg(test)]
mod tests;
