//! Search-index mappings generated from a schema

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::error::MappingError;
use crate::resolver::RefResolver;
use crate::visitor::{SchemaKind, SchemaVisitor};

/// Generate an index mapping covering every property reachable from the
/// schema at `schema_uri`.
///
/// A recursive schema stops at the first repeated position, which is
/// emitted as an object mapping without properties.
pub fn generate_schema_mapping(
    resolver: Arc<dyn RefResolver>,
    schema_uri: &str,
) -> Result<Value, MappingError> {
    let visitor = SchemaVisitor::new(&json!({"$ref": schema_uri}), resolver, None)?;
    schema_mapping(&visitor, &HashSet::new())
}

fn schema_mapping(
    visitor: &Arc<SchemaVisitor>,
    path: &HashSet<String>,
) -> Result<Value, MappingError> {
    match visitor.kind() {
        SchemaKind::Object => {
            let kind = if visitor.parent().is_none() {
                "object"
            } else {
                "nested"
            };
            let mut properties = Map::new();
            let position = visitor.path().unwrap_or_default();
            if !path.contains(position) {
                let mut sub_path = path.clone();
                sub_path.insert(position.to_string());
                for prop in visitor.properties()? {
                    let name = prop.name().unwrap_or_default().to_string();
                    properties.insert(name, schema_mapping(prop, &sub_path)?);
                }
            }
            Ok(json!({"type": kind, "properties": properties}))
        }
        SchemaKind::Array => match visitor.items()? {
            Some(items) => schema_mapping(items, path),
            None => Ok(Value::Null),
        },
        SchemaKind::Value => {
            let types = visitor.types();
            let has = |name: &str| types.iter().any(|t| t == name);
            let type_name = if has("boolean") {
                "boolean"
            } else if has("integer") {
                "long"
            } else if has("number") {
                "float"
            } else {
                "string"
            };
            Ok(json!({"type": type_name, "index": "not_analyzed"}))
        }
    }
}
