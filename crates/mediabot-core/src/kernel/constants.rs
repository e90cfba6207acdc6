/// Application name
pub const APP_NAME: &str = "mediabot";

/// Application version, compared against plugin `appVersion` constraints
pub const APP_VERSION: &str = "1.9.2";

/// Name of the manifest file every plugin folder must contain
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Folders inside the plugin root that are never treated as plugins
pub const SKIP_FOLDERS: &[&str] = &["__pycache__", ".cache", ".tmp"];

/// Prefix of staging folders created while a plugin archive is being installed
pub const INSTALL_STAGING_PREFIX: &str = ".install-";

/// Default plugins directory
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Default file holding every plugin's persisted configuration
pub const DEFAULT_PLUGIN_CONFIG_FILE: &str = "plugins_config.json";

/// Listener order used when a registration does not specify one
pub const DEFAULT_LISTENER_ORDER: i32 = 100;

/// Size of the background event worker pool
pub const DEFAULT_EVENT_WORKERS: usize = 8;
