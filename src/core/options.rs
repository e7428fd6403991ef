//! Option layers and their composition.
//!
//! A layer carries two maps: `overriders` replace whatever the base held for a
//! key, `appenders` concatenate onto it (base entries first). Folding layers
//! onto a base yields an immutable [`Options`] value that can be shared
//! between workers without locking.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recognized option keys.
pub mod keys {
    /// Output kind: `object`, `executable` or `driver`.
    pub const DEF_TYPE: &str = "compiler_def_type";
    /// Whether to strip symbols from the produced artifact.
    pub const STRIP: &str = "compiler_strip";
    /// Extra compiler flags.
    pub const FLAGS: &str = "compiler_flags";
    /// Preprocessor defines, `NAME` or `NAME=VALUE`.
    pub const DEFINES: &str = "compiler_defines";
    /// Libraries to link, without the `-l` prefix.
    pub const LIBS: &str = "compiler_libs";
    /// Extra linker flags.
    pub const LINKER_FLAGS: &str = "linker_flags";
    /// Logical name of the compiler driver (`gcc`, `g++`).
    pub const DRIVER: &str = "compiler_driver";
}

/// Compiler driver used when a target does not pick one.
pub const DEFAULT_DRIVER: &str = "gcc";

/// Error reading a typed value out of effective options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("option `{key}` has invalid value `{value}`: expected {expected}")]
pub struct OptionError {
    pub key: String,
    pub value: String,
    pub expected: &'static str,
}

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl Value {
    /// Convert into a list, promoting scalars to a one-element list.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Value::Bool(b) => vec![b.to_string()],
            Value::Str(s) => vec![s],
            Value::List(items) => items,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<DefType> for Value {
    fn from(def_type: DefType) -> Self {
        Value::Str(def_type.as_str().to_string())
    }
}

/// A declared configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layer {
    /// Keys whose value replaces the base value.
    pub overriders: BTreeMap<String, Value>,
    /// Keys whose list is appended to the base value.
    pub appenders: BTreeMap<String, Vec<String>>,
}

impl Layer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Layer::default()
    }

    /// Set an overriding value.
    pub fn override_with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overriders.insert(key.into(), value.into());
        self
    }

    /// Append items for a key, after any items already appended by this layer.
    pub fn append<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appenders
            .entry(key.into())
            .or_default()
            .extend(items.into_iter().map(Into::into));
        self
    }

    /// Keys that appear in both maps of this layer.
    pub fn conflicting_keys(&self) -> Vec<&str> {
        self.overriders
            .keys()
            .filter(|key| self.appenders.contains_key(*key))
            .map(String::as_str)
            .collect()
    }

    /// Check if the layer declares nothing.
    pub fn is_empty(&self) -> bool {
        self.overriders.is_empty() && self.appenders.is_empty()
    }
}

/// Effective options: the result of composing layers onto a base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Options {
    values: BTreeMap<String, Value>,
}

impl Options {
    /// Options with no keys set.
    pub fn empty() -> Self {
        Options::default()
    }

    /// Apply a layer on top of these options, returning a new value.
    ///
    /// Overriders always win over appenders for the same key, whatever order
    /// the layer declared them in.
    pub fn compose(&self, layer: &Layer) -> Options {
        let mut values = self.values.clone();

        for (key, items) in &layer.appenders {
            let mut merged = values
                .remove(key)
                .map(Value::into_list)
                .unwrap_or_default();
            merged.extend(items.iter().cloned());
            values.insert(key.clone(), Value::List(merged));
        }

        for (key, value) in &layer.overriders {
            values.insert(key.clone(), value.clone());
        }

        Options { values }
    }

    /// Fold a chain of layers left to right.
    pub fn compose_all<'a>(&self, layers: impl IntoIterator<Item = &'a Layer>) -> Options {
        layers
            .into_iter()
            .fold(self.clone(), |acc, layer| acc.compose(layer))
    }

    /// Get the raw value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Iterate over all keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get a list-valued key. A string scalar reads as a one-element list.
    pub fn list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(Value::List(items)) => items,
            Some(Value::Str(s)) => std::slice::from_ref(s),
            Some(Value::Bool(_)) | None => &[],
        }
    }

    /// Get a boolean key. Accepts `"true"`/`"false"` strings.
    pub fn bool(&self, key: &str) -> Result<Option<bool>, OptionError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Str(s)) if s == "true" => Ok(Some(true)),
            Some(Value::Str(s)) if s == "false" => Ok(Some(false)),
            Some(other) => Err(OptionError {
                key: key.to_string(),
                value: other.to_string(),
                expected: "a boolean",
            }),
        }
    }

    /// Get a string key.
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Output kind selected by `compiler_def_type` (executable when unset).
    pub fn def_type(&self) -> Result<DefType, OptionError> {
        match self.values.get(keys::DEF_TYPE) {
            None => Ok(DefType::default()),
            Some(Value::Str(s)) => s.parse(),
            Some(other) => Err(OptionError {
                key: keys::DEF_TYPE.to_string(),
                value: other.to_string(),
                expected: DefType::EXPECTED,
            }),
        }
    }

    /// Whether `compiler_strip` is set.
    pub fn strip(&self) -> Result<bool, OptionError> {
        Ok(self.bool(keys::STRIP)?.unwrap_or(false))
    }

    /// `compiler_flags`.
    pub fn flags(&self) -> &[String] {
        self.list(keys::FLAGS)
    }

    /// `compiler_defines` as (name, optional value) pairs.
    pub fn defines(&self) -> Vec<(String, Option<String>)> {
        self.list(keys::DEFINES)
            .iter()
            .filter_map(|d| parse_define(d))
            .collect()
    }

    /// `compiler_libs`.
    pub fn libs(&self) -> &[String] {
        self.list(keys::LIBS)
    }

    /// `linker_flags`.
    pub fn linker_flags(&self) -> &[String] {
        self.list(keys::LINKER_FLAGS)
    }

    /// Logical compiler driver name.
    pub fn driver(&self) -> &str {
        self.str(keys::DRIVER).unwrap_or(DEFAULT_DRIVER)
    }
}

/// Parse a define entry (`NAME` or `NAME=VALUE`, optional `-D` prefix).
///
/// Returns `None` for an empty name.
pub fn parse_define(define: &str) -> Option<(String, Option<String>)> {
    let rest = define.strip_prefix("-D").unwrap_or(define).trim();

    match rest.split_once('=') {
        Some((name, _)) if name.is_empty() => None,
        Some((name, value)) => Some((name.to_string(), Some(value.to_string()))),
        None if rest.is_empty() => None,
        None => Some((rest.to_string(), None)),
    }
}

/// Output kind of a Compiler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefType {
    /// A plain relocatable object (`-c`).
    Object,
    /// A user-mode executable.
    #[default]
    Executable,
    /// A kernel-mode driver image.
    Driver,
}

impl DefType {
    const EXPECTED: &'static str = "one of `object`, `executable`, `driver`";

    /// Get the tag as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DefType::Object => "object",
            DefType::Executable => "executable",
            DefType::Driver => "driver",
        }
    }
}

impl FromStr for DefType {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object" | "obj" => Ok(DefType::Object),
            "executable" | "exe" => Ok(DefType::Executable),
            "driver" | "sys" => Ok(DefType::Driver),
            _ => Err(OptionError {
                key: keys::DEF_TYPE.to_string(),
                value: s.to_string(),
                expected: DefType::EXPECTED,
            }),
        }
    }
}

impl fmt::Display for DefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
