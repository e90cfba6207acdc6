use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::plugin_system::dependency::HostCapabilities;
use crate::storage::config::ConfigFormat;

/// Host configuration. Every field has a default, so a partial file or no
/// file at all is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Folder holding one subfolder per installed plugin
    pub plugin_dir: PathBuf,
    /// File holding every plugin's persisted config
    pub plugin_config_file: PathBuf,
    /// Version reported to plugin `appVersion` constraints
    pub app_version: String,
    /// Media server types this host is connected to, e.g. `emby`
    pub media_servers: Vec<String>,
    /// Size of the background event worker pool
    pub event_workers: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(constants::DEFAULT_PLUGINS_DIR),
            plugin_config_file: PathBuf::from(constants::DEFAULT_PLUGIN_CONFIG_FILE),
            app_version: constants::APP_VERSION.to_string(),
            media_servers: Vec::new(),
            event_workers: constants::DEFAULT_EVENT_WORKERS,
        }
    }
}

impl HostSettings {
    /// Read settings from a JSON, YAML or TOML file, chosen by extension.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::require_from_path(path)?;
        if !path.exists() {
            log::debug!("Settings file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, "read_to_string", path.to_path_buf()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        format.deserialize_value(&content)
    }

    /// Write settings in the format matching the file extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ConfigFormat::require_from_path(path)?;
        let content = format.serialize_value(self)?;
        fs::write(path, content).map_err(|e| Error::io(e, "write", path.to_path_buf()))
    }

    /// What plugins may require of this host
    pub fn host_capabilities(&self) -> HostCapabilities {
        HostCapabilities::new(self.app_version.clone(), self.media_servers.clone())
    }
}
