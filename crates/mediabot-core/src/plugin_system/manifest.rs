use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::kernel::constants;
use crate::plugin_system::args::EnumChoice;
use crate::plugin_system::error::{PluginSystemError, PluginSystemErrorSource};

/// Describes a plugin folder; read from its `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Numeric id assigned by the plugin catalogue, if any
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<i64>,

    /// Globally unique plugin name
    pub name: String,

    /// Short human-readable title
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Dotted plugin version
    #[serde(default)]
    pub version: String,

    /// External libraries the plugin needs; opaque to the core
    #[serde(default, deserialize_with = "null_as_default")]
    pub requirements: Vec<String>,

    /// Configuration UI descriptors
    #[serde(default, deserialize_with = "null_as_default")]
    pub config_field: Vec<ConfigField>,

    /// Capability name to constraint, e.g. `appVersion` to `>=1.2.0`
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: BTreeMap<String, Value>,

    #[serde(default)]
    pub logo_url: Option<String>,

    #[serde(default)]
    pub github_url: Option<String>,

    #[serde(default)]
    pub help_doc_url: Option<String>,

    /// File this manifest was read from
    #[serde(skip)]
    path: Option<PathBuf>,
}

fn read_error(path: &Path, e: std::io::Error) -> PluginSystemError {
    PluginSystemError::ManifestError {
        path: path.to_path_buf(),
        message: "cannot read manifest".to_string(),
        source: Some(Box::new(e)),
    }
}

/// Kind of a configuration field. Kinds the core does not know are kept
/// verbatim in `Other` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Int,
    Bool,
    Enum,
    #[serde(untagged)]
    Other(String),
}

/// One entry of a manifest's `configField` list.
///
/// `enumValues` may be written either as a name to value map or as a list of
/// `{name, value}` objects; it is always held and written back as the list.
/// Keys the core does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub field_type: FieldType,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_enum_values"
    )]
    pub enum_values: Option<Vec<EnumChoice>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigField {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            enum_values: None,
            extra: Map::new(),
        }
    }

    /// The `name` key of the field, if present
    pub fn name(&self) -> Option<&str> {
        self.extra.get("name").and_then(Value::as_str)
    }
}

impl PluginManifest {
    /// Create a manifest with only a name; everything else is empty
    pub fn new(name: &str, title: &str, version: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            title: title.to_string(),
            author: String::new(),
            description: None,
            version: version.to_string(),
            requirements: Vec::new(),
            config_field: Vec::new(),
            dependencies: BTreeMap::new(),
            logo_url: None,
            github_url: None,
            help_doc_url: None,
            path: None,
        }
    }

    /// Add a dependency constraint
    pub fn add_dependency(&mut self, key: &str, constraint: &str) -> &mut Self {
        self.dependencies
            .insert(key.to_string(), Value::String(constraint.to_string()));
        self
    }

    /// Read `manifest.json` from a plugin folder
    pub fn from_folder(folder: &Path) -> Result<Self, PluginSystemError> {
        Self::load(&folder.join(constants::MANIFEST_FILENAME))
    }

    /// Read and validate a manifest file
    pub fn load(path: &Path) -> Result<Self, PluginSystemError> {
        let content = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
        Self::parse_file(path, &content)
    }

    /// [`from_folder`](Self::from_folder) without blocking the runtime
    pub async fn read_from_folder(folder: &Path) -> Result<Self, PluginSystemError> {
        let path = folder.join(constants::MANIFEST_FILENAME);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| read_error(&path, e))?;
        Self::parse_file(&path, &content)
    }

    fn parse_file(path: &Path, content: &str) -> Result<Self, PluginSystemError> {
        let mut manifest = Self::parse(content).map_err(|e| match e {
            PluginSystemError::ManifestError { message, source, .. } => {
                PluginSystemError::ManifestError {
                    path: path.to_path_buf(),
                    message,
                    source,
                }
            }
            other => other,
        })?;
        manifest.path = Some(path.to_path_buf());
        Ok(manifest)
    }

    /// Parse manifest JSON that does not come from a file
    pub fn parse(content: &str) -> Result<Self, PluginSystemError> {
        let manifest: PluginManifest =
            serde_json::from_str(content).map_err(|e| PluginSystemError::ManifestError {
                path: PathBuf::new(),
                message: format!("malformed manifest: {}", e),
                source: Some(Box::new(e)),
            })?;
        if manifest.name.trim().is_empty() {
            return Err(PluginSystemError::ManifestError {
                path: PathBuf::new(),
                message: "manifest has an empty 'name'".to_string(),
                source: None,
            });
        }
        Ok(manifest)
    }

    /// Write the manifest back to the file it was read from
    pub fn save(&self) -> Result<(), PluginSystemError> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| PluginSystemError::ManifestError {
                path: PathBuf::new(),
                message: format!("manifest of '{}' has no backing file", self.name),
                source: None,
            })?;
        self.save_to(path)
    }

    /// Write the manifest as pretty JSON to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), PluginSystemError> {
        let wrap = |source: PluginSystemErrorSource| PluginSystemError::LoadingError {
            plugin_id: self.name.clone(),
            path: Some(path.to_path_buf()),
            source: Box::new(source),
        };
        let content = serde_json::to_string_pretty(self).map_err(|e| wrap(e.into()))?;
        fs::write(path, content).map_err(|e| wrap(e.into()))
    }

    /// Title for log lines; falls back to the name
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("id {} is not an integer", n))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("id '{}' is not an integer", s))),
        other => Err(D::Error::custom(format!("unexpected id {}", other))),
    }
}

fn deserialize_enum_values<'de, D>(deserializer: D) -> Result<Option<Vec<EnumChoice>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(
            map.into_iter()
                .map(|(name, value)| {
                    let value = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    EnumChoice { name, value }
                })
                .collect(),
        )),
        list @ Value::Array(_) => serde_json::from_value(list).map(Some).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "enumValues must be a map or a list, got {}",
            other
        ))),
    }
}
