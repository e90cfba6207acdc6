use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::kernel::error::HandlerResult;
use crate::plugin_system::context::RegistrationContext;

/// Code side of a plugin. The folder's manifest names the plugin; the
/// implementation with the same [`Plugin::name`] is looked up in the host's
/// [`PluginTable`] and asked to register its listeners, commands and tasks.
pub trait Plugin: Send + Sync {
    /// Must match the `name` field of the plugin's manifest
    fn name(&self) -> &'static str;

    /// Declare everything the plugin contributes. An error or panic here
    /// rejects the plugin and nothing it declared is kept.
    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult;
}

/// Plugin implementations compiled into the host, keyed by name
#[derive(Default, Clone)]
pub struct PluginTable {
    entries: BTreeMap<&'static str, Arc<dyn Plugin>>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`PluginTable::insert`]
    pub fn with<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.insert(Arc::new(plugin));
        self
    }

    /// Add an implementation, returning the one it replaced
    pub fn insert(&mut self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        self.entries.insert(plugin.name(), plugin)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PluginTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTable")
            .field("entries", &self.names())
            .finish()
    }
}
