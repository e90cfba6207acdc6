//! # Mediabot Core Plugin System Errors
//!
//! Defines error types specific to the plugin system.
//!
//! [`PluginSystemError`] covers manifest parsing, capability negotiation,
//! registration, loading, installation and command invocation. Load-time
//! variants are logged by the loader and cause the plugin to be skipped;
//! `NotFound`, `CommandNotFound` and `InvalidParameter` are returned to the
//! caller that asked for a specific plugin, command or argument set.
use std::path::PathBuf;

use crate::plugin_system::dependency::DependencyError;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Plugin loading failed for '{plugin_id}': {source}")]
    LoadingError {
        plugin_id: String,
        path: Option<PathBuf>,
        #[source]
        source: Box<PluginSystemErrorSource>,
    },

    #[error("Plugin manifest error for '{path}': {message}")]
    ManifestError {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Plugin '{plugin_id}' is not supported by this host: {source}")]
    NotSupported {
        plugin_id: String,
        #[source]
        source: DependencyError,
    },

    #[error("Plugin not found: {plugin_id}")]
    NotFound { plugin_id: String },

    #[error("Command '{command}' not found in plugin '{plugin_id}'")]
    CommandNotFound { plugin_id: String, command: String },

    #[error("Invalid parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Plugin registration error for '{plugin_id}': {message}")]
    RegistrationError { plugin_id: String, message: String },

    #[error("Hook '{hook}' of plugin '{plugin_id}' failed: {message}")]
    HookError {
        plugin_id: String,
        hook: &'static str,
        message: String,
    },

    #[error("Plugin installation from '{origin}' failed: {message}")]
    InstallError {
        origin: String,
        message: String,
        #[source]
        source: Option<Box<PluginSystemErrorSource>>,
    },

    #[error("Internal plugin system error: {0}")]
    InternalError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemErrorSource {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Other: {0}")]
    Other(String),
}

impl PluginSystemError {
    pub(crate) fn install(
        origin: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<PluginSystemErrorSource>,
    ) -> Self {
        PluginSystemError::InstallError {
            origin: origin.into(),
            message: message.into(),
            source: Some(Box::new(source.into())),
        }
    }

    pub(crate) fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        PluginSystemError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}
