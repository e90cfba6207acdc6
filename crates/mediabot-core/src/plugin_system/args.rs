//! Command argument schemas.
//!
//! A plugin command declares its handler parameters as an ordered list of
//! [`ParamDecl`]s. [`infer_schema`] turns that list into an [`ArgSchemaMap`]
//! once, at registration time, and [`parse_args`] validates and coerces raw
//! JSON arguments against it on every invocation.
use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::plugin_system::error::PluginSystemError;

/// Validated and coerced arguments, in schema order
pub type ParsedArgs = Map<String, Value>;

/// Value type of a command argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgType {
    String,
    Int,
    Enum,
}

/// One selectable value of an enum argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumChoice {
    pub name: String,
    pub value: String,
}

impl EnumChoice {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Enum values are either fixed or computed each time they are needed
#[derive(Clone)]
pub enum EnumValues {
    Static(Vec<EnumChoice>),
    Supplier(Arc<dyn Fn() -> Vec<EnumChoice> + Send + Sync>),
}

impl EnumValues {
    pub fn resolve(&self) -> Vec<EnumChoice> {
        match self {
            EnumValues::Static(choices) => choices.clone(),
            EnumValues::Supplier(supplier) => supplier(),
        }
    }
}

impl fmt::Debug for EnumValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValues::Static(choices) => f.debug_tuple("Static").field(choices).finish(),
            EnumValues::Supplier(_) => f.debug_tuple("Supplier").finish_non_exhaustive(),
        }
    }
}

/// Rust enums usable as command arguments
pub trait ArgEnum: Sized {
    /// All choices, in display order
    fn choices() -> Vec<EnumChoice>;

    /// Symbolic name of this variant, used when it is a default value
    fn name(&self) -> &'static str;
}

/// Rust types that map directly onto an [`ArgType`]
pub trait ArgValueType {
    const ARG_TYPE: ArgType;
}

impl ArgValueType for String {
    const ARG_TYPE: ArgType = ArgType::String;
}

impl ArgValueType for &str {
    const ARG_TYPE: ArgType = ArgType::String;
}

impl ArgValueType for i64 {
    const ARG_TYPE: ArgType = ArgType::Int;
}

impl ArgValueType for i32 {
    const ARG_TYPE: ArgType = ArgType::Int;
}

impl ArgValueType for u32 {
    const ARG_TYPE: ArgType = ArgType::Int;
}

impl ArgValueType for u64 {
    const ARG_TYPE: ArgType = ArgType::Int;
}

/// Schema of a single command argument
#[derive(Debug, Clone)]
pub struct ArgSchema {
    pub arg_type: ArgType,
    pub label: String,
    pub help_text: String,
    pub name: String,
    pub enum_values: Option<EnumValues>,
    pub default_value: Option<Value>,
    pub required: bool,
    pub multi_value: bool,
}

impl ArgSchema {
    pub fn new(arg_type: ArgType, label: impl Into<String>, help_text: impl Into<String>) -> Self {
        Self {
            arg_type,
            label: label.into(),
            help_text: help_text.into(),
            name: String::new(),
            enum_values: None,
            default_value: None,
            required: true,
            multi_value: true,
        }
    }

    pub fn with_enum_values(mut self, choices: Vec<EnumChoice>) -> Self {
        self.enum_values = Some(EnumValues::Static(choices));
        self
    }

    pub fn with_enum_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> Vec<EnumChoice> + Send + Sync + 'static,
    {
        self.enum_values = Some(EnumValues::Supplier(Arc::new(supplier)));
        self
    }

    /// Set a default value; the argument becomes optional
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_value = (!value.is_null()).then_some(value);
        self.required = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn single_value(mut self) -> Self {
        self.multi_value = false;
        self
    }

    /// Accepted values of an enum argument
    pub fn accepted_values(&self) -> Vec<String> {
        self.enum_values
            .as_ref()
            .map(|values| values.resolve().into_iter().map(|c| c.value).collect())
            .unwrap_or_default()
    }

    fn apply_param_default(&mut self, default: &ParamDefault) {
        match default {
            ParamDefault::Absent => {}
            ParamDefault::Null => self.required = false,
            ParamDefault::Value(value) => {
                self.required = false;
                self.default_value = Some(value.clone());
            }
        }
    }
}

impl Serialize for ArgSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ArgSchema", 8)?;
        state.serialize_field("argType", &self.arg_type)?;
        state.serialize_field("label", &self.label)?;
        state.serialize_field("helper", &self.help_text)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field(
            "enumValues",
            &self.enum_values.as_ref().map(EnumValues::resolve),
        )?;
        state.serialize_field("defaultValue", &self.default_value)?;
        state.serialize_field("required", &self.required)?;
        state.serialize_field("multiValue", &self.multi_value)?;
        state.end()
    }
}

/// How a handler parameter is annotated
#[derive(Debug, Clone)]
pub enum ParamAnnotation {
    /// The invocation context parameter; never part of the schema
    Context,
    /// A concrete type; label and help default to the parameter name
    Type {
        arg_type: ArgType,
        enum_values: Option<EnumValues>,
    },
    /// Explicit type, label and help, with an optional default
    Structured {
        arg_type: Option<ArgType>,
        label: String,
        help: String,
        default: Option<Value>,
    },
    /// `(type, label, help)` given positionally
    Tuple(ArgType, String, String),
    /// A complete schema used as-is apart from its name
    Schema(ArgSchema),
    /// No recognisable type
    Untyped,
}

#[derive(Debug, Clone, PartialEq)]
enum ParamDefault {
    Absent,
    Null,
    Value(Value),
}

/// One declared handler parameter
#[derive(Debug, Clone)]
pub struct ParamDecl {
    name: String,
    annotation: ParamAnnotation,
    default: ParamDefault,
    choices: Option<EnumValues>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, annotation: ParamAnnotation) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: ParamDefault::Absent,
            choices: None,
        }
    }

    pub fn context(name: impl Into<String>) -> Self {
        Self::new(name, ParamAnnotation::Context)
    }

    /// A parameter of a plain Rust type, e.g. `ParamDecl::typed::<i64>("count")`
    pub fn typed<T: ArgValueType>(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ParamAnnotation::Type {
                arg_type: T::ARG_TYPE,
                enum_values: None,
            },
        )
    }

    pub fn enumeration<E: ArgEnum>(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ParamAnnotation::Type {
                arg_type: ArgType::Enum,
                enum_values: Some(EnumValues::Static(E::choices())),
            },
        )
    }

    pub fn structured(
        name: impl Into<String>,
        arg_type: ArgType,
        label: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            ParamAnnotation::Structured {
                arg_type: Some(arg_type),
                label: label.into(),
                help: help.into(),
                default: None,
            },
        )
    }

    pub fn tuple(name: impl Into<String>, annotation: (ArgType, &str, &str)) -> Self {
        let (arg_type, label, help) = annotation;
        Self::new(
            name,
            ParamAnnotation::Tuple(arg_type, label.to_string(), help.to_string()),
        )
    }

    pub fn schema(name: impl Into<String>, schema: ArgSchema) -> Self {
        Self::new(name, ParamAnnotation::Schema(schema))
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, ParamAnnotation::Untyped)
    }

    /// Declare a default value. `Value::Null` makes the parameter optional
    /// without giving it a default.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = if value.is_null() {
            ParamDefault::Null
        } else {
            ParamDefault::Value(value)
        };
        self
    }

    /// Attach the choices of `E` to an enum parameter declared by
    /// [`structured`](Self::structured) or [`tuple`](Self::tuple).
    /// Choices carried by the annotation itself take precedence.
    pub fn with_choices<E: ArgEnum>(mut self) -> Self {
        self.choices = Some(EnumValues::Static(E::choices()));
        self
    }

    /// Like [`with_choices`](Self::with_choices), resolved on every parse
    pub fn with_choice_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> Vec<EnumChoice> + Send + Sync + 'static,
    {
        self.choices = Some(EnumValues::Supplier(Arc::new(supplier)));
        self
    }

    /// Declare an enum variant as the default; it is stored by name
    pub fn with_enum_default<E: ArgEnum>(self, variant: E) -> Self {
        self.with_default(variant.name())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn into_schema(self) -> Option<ArgSchema> {
        let name = self.name;
        let mut schema = match self.annotation {
            ParamAnnotation::Context => return None,
            ParamAnnotation::Schema(schema) => schema,
            ParamAnnotation::Structured {
                arg_type,
                label,
                help,
                default,
            } => {
                let schema = ArgSchema::new(arg_type.unwrap_or(ArgType::String), label, help);
                match default {
                    Some(value) => schema.with_default(value),
                    None => schema,
                }
            }
            ParamAnnotation::Tuple(arg_type, label, help) => ArgSchema::new(arg_type, label, help),
            ParamAnnotation::Type {
                arg_type,
                enum_values,
            } => {
                let mut schema = ArgSchema::new(arg_type, name.clone(), name.clone());
                schema.enum_values = enum_values;
                schema
            }
            ParamAnnotation::Untyped => ArgSchema::new(ArgType::String, name.clone(), name.clone()),
        };
        schema.name = name;
        if schema.enum_values.is_none() {
            schema.enum_values = self.choices;
        }
        if schema.arg_type == ArgType::Enum && schema.enum_values.is_none() {
            log::warn!("Enum parameter '{}' declares no choices; every value will be rejected", schema.name);
        }
        // A default carried by the annotation itself wins over the declared one.
        if schema.default_value.is_none() {
            schema.apply_param_default(&self.default);
        }
        Some(schema)
    }
}

/// Ordered argument schemas of one command
#[derive(Debug, Clone, Default)]
pub struct ArgSchemaMap {
    entries: Vec<ArgSchema>,
}

impl ArgSchemaMap {
    pub fn get(&self, name: &str) -> Option<&ArgSchema> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgSchema> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ArgSchema> for ArgSchemaMap {
    fn from_iter<I: IntoIterator<Item = ArgSchema>>(iter: I) -> Self {
        let mut map = ArgSchemaMap::default();
        for schema in iter {
            // A later declaration with the same name replaces the earlier one in place.
            match map.entries.iter_mut().find(|entry| entry.name == schema.name) {
                Some(existing) => *existing = schema,
                None => map.entries.push(schema),
            }
        }
        map
    }
}

impl Serialize for ArgSchemaMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, entry)?;
        }
        map.end()
    }
}

/// Build the argument schema of a handler from its parameter declarations
pub fn infer_schema(params: &[ParamDecl]) -> ArgSchemaMap {
    params.iter().cloned().filter_map(ParamDecl::into_schema).collect()
}

/// Validate and coerce raw arguments against a schema.
///
/// Keys not present in the schema are dropped. Null, empty strings and empty
/// lists count as absent.
pub fn parse_args(raw: &Map<String, Value>, schema: &ArgSchemaMap) -> Result<ParsedArgs, PluginSystemError> {
    let mut parsed = ParsedArgs::new();
    for entry in schema.iter() {
        let value = match raw.get(&entry.name).filter(|value| !is_blank(value)) {
            Some(value) => coerce(entry, value)?,
            None if entry.required => {
                return Err(PluginSystemError::invalid_parameter(
                    &entry.name,
                    format!("a value for '{}' is required", entry.label),
                ));
            }
            None => entry.default_value.clone().unwrap_or(Value::Null),
        };
        parsed.insert(entry.name.clone(), value);
    }
    Ok(parsed)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn coerce(entry: &ArgSchema, value: &Value) -> Result<Value, PluginSystemError> {
    match entry.arg_type {
        ArgType::String => Ok(Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ArgType::Int => coerce_int(entry, value).map(Value::from),
        ArgType::Enum => {
            let accepted = entry.accepted_values();
            let check = |candidate: &Value| match candidate.as_str() {
                Some(s) if accepted.iter().any(|a| a == s) => Ok(()),
                _ => Err(PluginSystemError::invalid_parameter(
                    &entry.name,
                    format!(
                        "'{}' must be one of [{}], got {}",
                        entry.label,
                        accepted.join(", "),
                        candidate
                    ),
                )),
            };
            match value {
                Value::Array(items) => items.iter().try_for_each(check)?,
                scalar => check(scalar)?,
            }
            Ok(value.clone())
        }
    }
}

// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
const I64_LOWER: f64 = i64::MIN as f64;
const I64_UPPER: f64 = i64::MAX as f64;

fn coerce_int(entry: &ArgSchema, value: &Value) -> Result<i64, PluginSystemError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(f))
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        PluginSystemError::invalid_parameter(
            &entry.name,
            format!("'{}' must be an integer, got {}", entry.label, value),
        )
    })
}
