//! Capability negotiation between a plugin's declared dependencies and the
//! running host.
//!
//! A manifest's `dependencies` map names a capability and a constraint.
//! Two capabilities are understood:
//!
//! - `appVersion`: an operator (`>=`, `>`, `<=`, `<`, `==`, `=`) followed by a
//!   dotted version, compared against the running application version.
//! - `mediaServer`: a media-server type name, matched case-insensitively
//!   against the configured servers. `all` always passes.
//!
//! Any other key is ignored.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kernel::constants;
use crate::plugin_system::version::{Version, VersionError};

pub const APP_VERSION_KEY: &str = "appVersion";
pub const MEDIA_SERVER_KEY: &str = "mediaServer";
pub const ANY_MEDIA_SERVER: &str = "all";

/// Error that can occur when a plugin's dependencies are evaluated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("requires application version {required}, but {running} is running")]
    AppVersionMismatch { required: String, running: String },

    #[error("requires media server '{required}', configured servers: [{}]", .configured.join(", "))]
    MediaServerUnavailable { required: String, configured: Vec<String> },

    #[error("dependency '{key}' must be a string, got {value}")]
    InvalidValue { key: String, value: String },

    #[error("invalid version in dependency '{key}': {source}")]
    InvalidVersion {
        key: String,
        #[source]
        source: VersionError,
    },
}

/// Comparison operator of an `appVersion` constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
}

impl Comparison {
    // Two-character operators first so ">=" is not read as ">".
    const OPERATORS: [(&'static str, Comparison); 6] = [
        (">=", Comparison::GreaterOrEqual),
        ("<=", Comparison::LessOrEqual),
        ("==", Comparison::Equal),
        (">", Comparison::Greater),
        ("<", Comparison::Less),
        ("=", Comparison::Equal),
    ];

    /// Split a constraint into its operator and the remaining version text
    pub fn split(expression: &str) -> Option<(Comparison, &str)> {
        let expression = expression.trim_start();
        Self::OPERATORS.iter().find_map(|(symbol, comparison)| {
            expression
                .strip_prefix(symbol)
                .map(|rest| (*comparison, rest.trim()))
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::GreaterOrEqual => ">=",
            Comparison::Greater => ">",
            Comparison::LessOrEqual => "<=",
            Comparison::Less => "<",
            Comparison::Equal => "==",
        }
    }

    /// Whether `running.cmp(required)` satisfies this operator
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::Equal => ordering == Ordering::Equal,
        }
    }
}

/// A parsed `appVersion` constraint such as `>=1.2.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub comparison: Comparison,
    pub version: Version,
}

impl VersionConstraint {
    pub fn is_satisfied_by(&self, running: &Version) -> bool {
        self.comparison.holds(running.cmp(&self.version))
    }
}

/// Parse failures of a constraint string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("constraint '{0}' has no comparison operator")]
    MissingOperator(String),
    #[error(transparent)]
    Version(#[from] VersionError),
}

impl FromStr for VersionConstraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (comparison, rest) =
            Comparison::split(s).ok_or_else(|| ConstraintError::MissingOperator(s.to_string()))?;
        Ok(Self {
            comparison,
            version: Version::parse(rest)?,
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.comparison.symbol(), self.version)
    }
}

/// What the running host offers to plugins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCapabilities {
    pub app_version: String,
    pub media_servers: Vec<String>,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            app_version: constants::APP_VERSION.to_string(),
            media_servers: Vec::new(),
        }
    }
}

impl HostCapabilities {
    pub fn new(app_version: impl Into<String>, media_servers: Vec<String>) -> Self {
        Self {
            app_version: app_version.into(),
            media_servers,
        }
    }
}

/// Evaluates dependency maps against a fixed set of host capabilities
#[derive(Debug, Clone, Default)]
pub struct CompatibilityGate {
    host: HostCapabilities,
}

impl CompatibilityGate {
    pub fn new(host: HostCapabilities) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &HostCapabilities {
        &self.host
    }

    /// Check every understood dependency; the first violation is returned.
    pub fn check(
        &self,
        dependencies: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), DependencyError> {
        for (key, value) in dependencies {
            match key.as_str() {
                APP_VERSION_KEY => self.check_app_version(as_text(key, value)?)?,
                MEDIA_SERVER_KEY => self.check_media_server(as_text(key, value)?)?,
                other => log::debug!("Ignoring unknown dependency key '{}'", other),
            }
        }
        Ok(())
    }

    fn check_app_version(&self, expression: &str) -> Result<(), DependencyError> {
        let constraint = match expression.parse::<VersionConstraint>() {
            Ok(constraint) => constraint,
            Err(ConstraintError::MissingOperator(_)) => {
                log::warn!(
                    "Ignoring appVersion constraint '{}' without a comparison operator",
                    expression
                );
                return Ok(());
            }
            Err(ConstraintError::Version(source)) => {
                return Err(DependencyError::InvalidVersion {
                    key: APP_VERSION_KEY.to_string(),
                    source,
                });
            }
        };

        let running = Version::parse(&self.host.app_version).map_err(|source| {
            DependencyError::InvalidVersion {
                key: APP_VERSION_KEY.to_string(),
                source,
            }
        })?;

        if constraint.is_satisfied_by(&running) {
            Ok(())
        } else {
            Err(DependencyError::AppVersionMismatch {
                required: constraint.to_string(),
                running: running.to_string(),
            })
        }
    }

    fn check_media_server(&self, required: &str) -> Result<(), DependencyError> {
        let required = required.trim();
        if required.eq_ignore_ascii_case(ANY_MEDIA_SERVER) {
            return Ok(());
        }
        let available = self
            .host
            .media_servers
            .iter()
            .any(|server| server.eq_ignore_ascii_case(required));
        if available {
            Ok(())
        } else {
            Err(DependencyError::MediaServerUnavailable {
                required: required.to_string(),
                configured: self.host.media_servers.clone(),
            })
        }
    }
}

fn as_text<'a>(key: &str, value: &'a serde_json::Value) -> Result<&'a str, DependencyError> {
    value.as_str().ok_or_else(|| DependencyError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
