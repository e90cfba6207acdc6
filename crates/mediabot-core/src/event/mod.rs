//! # Mediabot Core Event System
//!
//! Application-internal events and the bus that routes them to listeners.
//!
//! ## Key Components:
//!
//! - **[`types`]**: the [`EventType`] catalog, the [`Event`] value and its
//!   [`EventBuilder`].
//! - **[`listener`]**: [`EventListener`], a handler bound to one or more event
//!   types with an `order`, optionally owned by a plugin.
//! - **[`bus`]**: [`EventBus`], which keeps per-type ordered listener lists
//!   and publishes either awaiting every listener or on a bounded background
//!   worker pool. Listener failures are isolated and logged.
//! - **[`error`]**: [`EventSystemError`](error::EventSystemError).
//!
//! Plugins do not register on the bus directly; their listeners arrive via
//! the plugin loader, which stamps them with the owning plugin. Listeners
//! added straight to the bus are built-in and receive an empty context.
pub mod bus;
pub mod error;
pub mod listener;
pub mod types;

pub use bus::EventBus;
pub use listener::{sync_listener, EventListener, ListenerContext, ListenerId, PluginOwner};
pub use types::{Event, EventBuilder, EventData, EventType};

#[cfg(test)]
mod tests;
