//! Typed view of a mapping description
//!
//! A mapping description binds source columns to one schema position. The
//! raw JSON is checked against the bundled meta-schema once, at the root of
//! a mapping, and then read through [`MappingDescription`].

use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::MappingError;

const MAPPING_META_SCHEMA: &str = include_str!("../schemas/mapping.json");

static META_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::from_str(MAPPING_META_SCHEMA).expect("bundled mapping meta-schema is valid JSON")
});

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MappingDescription {
    /// Schema of the mapped document; required at the root.
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub transforms: Vec<String>,
    /// `%s` template applied across all transformed values.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Column name used when flattening, instead of the first source column.
    #[serde(default)]
    pub dump: Option<String>,
    /// Nested mappings keyed by property name.
    #[serde(default)]
    pub mapping: IndexMap<String, OneOrMany>,
    /// Skip this branch when it produced no values.
    #[serde(default)]
    pub optional: bool,
}

/// A nested mapping entry: a single description or several for one property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Many(Vec<Value>),
    One(Value),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[Value] {
        match self {
            OneOrMany::Many(values) => values,
            OneOrMany::One(value) => std::slice::from_ref(value),
        }
    }
}

impl MappingDescription {
    pub fn from_value(value: &Value) -> Result<Self, MappingError> {
        Ok(Self::deserialize(value)?)
    }

    /// Source columns read by a leaf mapping, in declaration order.
    pub fn source_columns(&self) -> Vec<&str> {
        match (&self.columns, &self.column) {
            (Some(columns), _) => columns.iter().map(String::as_str).collect(),
            (None, Some(column)) => vec![column.as_str()],
            (None, None) => Vec::new(),
        }
    }

    /// Column written by `flatten` for a leaf mapping.
    pub fn dump_column(&self) -> Option<&str> {
        self.dump
            .as_deref()
            .or_else(|| self.source_columns().first().copied())
    }
}

/// The bundled mapping meta-schema.
pub fn meta_schema() -> &'static Value {
    &META_SCHEMA
}

/// Check a mapping description against the meta-schema.
pub fn validate_mapping(mapping: &Value) -> Result<(), MappingError> {
    let validator = jsonschema::validator_for(meta_schema())
        .map_err(|e| MappingError::InvalidValidationSchema(e.to_string()))?;
    let errors: Vec<String> = validator
        .iter_errors(mapping)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MappingError::InvalidMapping { errors })
    }
}
