//! # Mediabot Core Storage
//!
//! File access behind the [`StorageProvider`] trait and the persisted
//! per-plugin configuration consumed by the plugin runtime.
pub mod config;
pub mod error;
pub mod local;
pub mod provider;

pub use config::{
    ConfigData, ConfigFormat, FilePluginConfigStore, MemoryPluginConfigStore, PluginConfigStore,
};
pub use local::LocalStorageProvider;
pub use provider::StorageProvider;

#[cfg(test)]
mod tests;
