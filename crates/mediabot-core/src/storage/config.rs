use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::StorageProvider;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    /// Like [`ConfigFormat::from_path`], but an unknown extension is an error
    pub fn require_from_path(path: &Path) -> Result<Self> {
        Self::from_path(path).ok_or_else(|| {
            StorageSystemError::UnsupportedConfigFormat(path.display().to_string()).into()
        })
    }

    /// Serialize any value in this format
    pub fn serialize_value<T: Serialize>(&self, value: &T) -> Result<String> {
        let text = match self {
            ConfigFormat::Json => serde_json::to_string_pretty(value)
                .map_err(|e| StorageSystemError::serialization("json", e))?,
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| StorageSystemError::serialization("yaml", e))?
            }
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => {
                toml::to_string_pretty(value).map_err(|e| StorageSystemError::serialization("toml", e))?
            }
        };
        Ok(text)
    }

    /// Deserialize any value from text in this format
    pub fn deserialize_value<T: DeserializeOwned>(&self, data: &str) -> Result<T> {
        let value = match self {
            ConfigFormat::Json => {
                serde_json::from_str(data).map_err(|e| StorageSystemError::deserialization("json", e))?
            }
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => {
                serde_yaml::from_str(data).map_err(|e| StorageSystemError::deserialization("yaml", e))?
            }
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => {
                toml::from_str(data).map_err(|e| StorageSystemError::deserialization("toml", e))?
            }
        };
        Ok(value)
    }
}

/// In-memory representation of configuration data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    /// Raw configuration values
    #[serde(flatten)]
    values: HashMap<String, Value>,
}

impl ConfigData {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Raw JSON value of a key
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| StorageSystemError::serialization("json", e))?;
        self.values.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Remove a configuration value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get all keys
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge with another config, overriding existing values
    pub fn merge(&mut self, other: &ConfigData) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Copy into a JSON object, keys sorted
    pub fn to_json_map(&self) -> Map<String, Value> {
        let sorted: BTreeMap<&String, &Value> = self.values.iter().collect();
        sorted
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        format.serialize_value(self)
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self> {
        format.deserialize_value(data)
    }
}

/// Per-plugin configuration consumed by the plugin runtime
pub trait PluginConfigStore: Send + Sync + Debug {
    /// Current config of a plugin; empty if it has none
    fn get(&self, plugin: &str) -> Result<ConfigData>;

    /// Replace a plugin's config in memory
    fn set(&self, plugin: &str, config: ConfigData) -> Result<()>;

    /// Drop a plugin's config from memory; true if it existed
    fn remove(&self, plugin: &str) -> Result<bool>;

    /// Write the current state to durable storage
    fn persist(&self) -> Result<()>;

    /// Names of every plugin with a stored config
    fn plugins(&self) -> Result<Vec<String>>;
}

type ConfigEntries = BTreeMap<String, ConfigData>;

fn read_lock<'a>(lock: &'a RwLock<ConfigEntries>, what: &str) -> Result<RwLockReadGuard<'a, ConfigEntries>> {
    lock.read()
        .map_err(|_| StorageSystemError::LockPoisoned(what.to_string()).into())
}

fn write_lock<'a>(lock: &'a RwLock<ConfigEntries>, what: &str) -> Result<RwLockWriteGuard<'a, ConfigEntries>> {
    lock.write()
        .map_err(|_| StorageSystemError::LockPoisoned(what.to_string()).into())
}

/// Every plugin's config kept in one file, keyed by plugin name.
///
/// The file format follows its extension (JSON, or YAML/TOML when the
/// matching features are enabled). A missing file is an empty store.
#[derive(Debug)]
pub struct FilePluginConfigStore {
    provider: Arc<dyn StorageProvider>,
    path: PathBuf,
    format: ConfigFormat,
    entries: RwLock<ConfigEntries>,
}

impl FilePluginConfigStore {
    /// Open the store at `path`, resolved by `provider`
    pub fn open(provider: Arc<dyn StorageProvider>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = ConfigFormat::require_from_path(&path)?;
        let entries: ConfigEntries = if provider.exists(&path) {
            let content = provider.read_to_string(&path)?;
            if content.trim().is_empty() {
                ConfigEntries::new()
            } else {
                format.deserialize_value(&content)?
            }
        } else {
            ConfigEntries::new()
        };
        log::debug!(
            "Opened plugin config store {} with {} entr{}",
            path.display(),
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" }
        );
        Ok(Self {
            provider,
            path,
            format,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PluginConfigStore for FilePluginConfigStore {
    fn get(&self, plugin: &str) -> Result<ConfigData> {
        let entries = read_lock(&self.entries, "plugin config store")?;
        Ok(entries.get(plugin).cloned().unwrap_or_default())
    }

    fn set(&self, plugin: &str, config: ConfigData) -> Result<()> {
        write_lock(&self.entries, "plugin config store")?.insert(plugin.to_string(), config);
        Ok(())
    }

    fn remove(&self, plugin: &str) -> Result<bool> {
        Ok(write_lock(&self.entries, "plugin config store")?
            .remove(plugin)
            .is_some())
    }

    fn persist(&self) -> Result<()> {
        let content = {
            let entries = read_lock(&self.entries, "plugin config store")?;
            self.format.serialize_value(&*entries)?
        };
        self.provider.write_string(&self.path, &content)
    }

    fn plugins(&self) -> Result<Vec<String>> {
        Ok(read_lock(&self.entries, "plugin config store")?
            .keys()
            .cloned()
            .collect())
    }
}

/// Non-persistent store for hosts without a config file
#[derive(Debug, Default)]
pub struct MemoryPluginConfigStore {
    entries: RwLock<ConfigEntries>,
}

impl MemoryPluginConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginConfigStore for MemoryPluginConfigStore {
    fn get(&self, plugin: &str) -> Result<ConfigData> {
        let entries = read_lock(&self.entries, "memory config store")?;
        Ok(entries.get(plugin).cloned().unwrap_or_default())
    }

    fn set(&self, plugin: &str, config: ConfigData) -> Result<()> {
        write_lock(&self.entries, "memory config store")?.insert(plugin.to_string(), config);
        Ok(())
    }

    fn remove(&self, plugin: &str) -> Result<bool> {
        Ok(write_lock(&self.entries, "memory config store")?
            .remove(plugin)
            .is_some())
    }

    fn persist(&self) -> Result<()> {
        Ok(())
    }

    fn plugins(&self) -> Result<Vec<String>> {
        Ok(read_lock(&self.entries, "memory config store")?
            .keys()
            .cloned()
            .collect())
    }
}
