//! Record-to-document mapping
//!
//! A [`Mapper`] binds a mapping description to a [`SchemaVisitor`] and
//! turns flat records into nested documents shaped by the schema. The
//! mapper tree follows the mapping description, so it is finite even when
//! the schema is recursive; it is built completely at construction and
//! never changes afterwards, which makes one mapper safe to share between
//! threads mapping different rows.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::description::{MappingDescription, validate_mapping};
use crate::error::MappingError;
use crate::record::Record;
use crate::resolver::RefResolver;
use crate::transforms::Pipeline;
use crate::validate::DocumentValidator;
use crate::value::{extract_value, flatten_value};
use crate::visitor::{SchemaKind, SchemaVisitor};

#[derive(Debug)]
pub struct Mapper {
    mapping: MappingDescription,
    visitor: Arc<SchemaVisitor>,
    root: bool,
    node: MapperNode,
}

#[derive(Debug)]
enum MapperNode {
    /// One child per mapping entry that names a declared property.
    Object(Vec<Mapper>),
    /// The item mapper; reuses this node's mapping description.
    Array(Box<Mapper>),
    Value(Pipeline),
}

/// One produced document and the validation errors found in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedRow {
    pub data: Value,
    pub errors: Vec<String>,
}

impl Mapper {
    /// Build a mapper from a root mapping description.
    ///
    /// The description is checked against the mapping meta-schema and must
    /// carry a `schema`. `scope` is the URI relative references in the
    /// mapping and its schema are resolved against.
    pub fn new(
        mapping: &Value,
        resolver: Arc<dyn RefResolver>,
        scope: Option<&str>,
    ) -> Result<Self, MappingError> {
        let mapping = resolve_mapping(mapping, resolver.as_ref(), scope)?;
        validate_mapping(&mapping)?;
        let description = MappingDescription::from_value(&mapping)?;
        let schema = description
            .schema
            .as_ref()
            .ok_or(MappingError::MissingSchema("root mapping"))?;
        let visitor = SchemaVisitor::new(schema, resolver, scope)?;
        Self::build(description, visitor, true, scope)
    }

    fn bind(
        mapping: &Value,
        visitor: Arc<SchemaVisitor>,
        scope: Option<&str>,
    ) -> Result<Self, MappingError> {
        let mapping = resolve_mapping(mapping, visitor.resolver().as_ref(), scope)?;
        let description = MappingDescription::from_value(&mapping)?;
        Self::build(description, visitor, false, scope)
    }

    fn build(
        mapping: MappingDescription,
        visitor: Arc<SchemaVisitor>,
        root: bool,
        scope: Option<&str>,
    ) -> Result<Self, MappingError> {
        let node = match visitor.kind() {
            SchemaKind::Object => {
                let mut children = Vec::new();
                for (name, entries) in &mapping.mapping {
                    let Some(prop) = visitor.get_property(name)? else {
                        warn!(
                            "Ignoring mapping for {}: not a property of {}",
                            name,
                            visitor.path().unwrap_or("<anonymous schema>")
                        );
                        continue;
                    };
                    for entry in entries.as_slice() {
                        children.push(Self::bind(entry, prop.clone(), scope)?);
                    }
                }
                MapperNode::Object(children)
            }
            SchemaKind::Array => {
                let items = visitor
                    .items()?
                    .cloned()
                    .ok_or_else(|| MappingError::InvalidSchema {
                        path: visitor.path().unwrap_or_default().to_string(),
                        found: "array without items".to_string(),
                    })?;
                let item = Self::build(mapping.clone(), items, false, scope)?;
                MapperNode::Array(Box::new(item))
            }
            SchemaKind::Value => MapperNode::Value(Pipeline::new(&mapping.transforms)?),
        };
        Ok(Self {
            mapping,
            visitor,
            root,
            node,
        })
    }

    pub fn visitor(&self) -> &Arc<SchemaVisitor> {
        &self.visitor
    }

    pub fn description(&self) -> &MappingDescription {
        &self.mapping
    }

    /// Property name this mapper fills in its parent object.
    pub fn name(&self) -> Option<&str> {
        self.visitor.name()
    }

    /// Optional branches are left out when they produced no values.
    pub fn optional(&self) -> bool {
        self.mapping.optional
    }

    /// Child mappers of an object node, in mapping declaration order.
    pub fn children(&self) -> &[Mapper] {
        match &self.node {
            MapperNode::Object(children) => children,
            MapperNode::Array(item) => std::slice::from_ref(item.as_ref()),
            MapperNode::Value(_) => &[],
        }
    }

    /// Map one flat record into a document.
    ///
    /// Returns whether nothing in this branch produced a value, and the
    /// produced value.
    pub fn apply(&self, row: &dyn Record) -> (bool, Value) {
        match &self.node {
            MapperNode::Object(children) => {
                let mut obj = Map::new();
                if self.root {
                    obj.insert(
                        "$schema".to_string(),
                        self.visitor.path().map_or(Value::Null, Value::from),
                    );
                }
                let mut obj_empty = true;
                for child in children {
                    let (empty, value) = child.apply(row);
                    if empty && child.optional() {
                        continue;
                    }
                    obj_empty &= empty;

                    let name = child.name().unwrap_or_default();
                    match obj.get_mut(name) {
                        Some(Value::Array(existing)) if child.visitor.is_array() => {
                            if let Value::Array(items) = value {
                                existing.extend(items);
                            }
                        }
                        _ => {
                            obj.insert(name.to_string(), value);
                        }
                    }
                }
                (obj_empty, Value::Object(obj))
            }
            MapperNode::Array(item) => {
                let (empty, value) = item.apply(row);
                (empty, Value::Array(vec![value]))
            }
            MapperNode::Value(pipeline) => extract_value(&self.mapping, pipeline, &self.visitor, row),
        }
    }

    /// Write a produced document back into flat columns.
    ///
    /// Only the nesting is reversed: values that went through lossy
    /// transforms (hashing, slugs, joins, case folding) are written as they
    /// appear in the document.
    ///
    /// Several mapping entries feeding one array are matched to its elements
    /// by position. When an earlier optional entry was skipped by `apply`,
    /// later elements are written under that entry's columns. Re-applying
    /// the flattened row still yields the same document shape.
    pub fn flatten(&self, data: &Value) -> IndexMap<String, String> {
        let mut row = IndexMap::new();
        self.flatten_into(data, &mut row);
        row
    }

    fn flatten_into(&self, data: &Value, row: &mut IndexMap<String, String>) {
        match &self.node {
            MapperNode::Object(children) => {
                // Entries feeding the same array each contributed one element.
                let mut positions: HashMap<&str, usize> = HashMap::new();
                for child in children {
                    let name = child.name().unwrap_or_default();
                    let Some(value) = data.get(name) else {
                        continue;
                    };
                    if child.visitor.is_array() {
                        let position = positions.entry(name).or_default();
                        child.flatten_element(value, *position, row);
                        *position += 1;
                    } else {
                        child.flatten_into(value, row);
                    }
                }
            }
            MapperNode::Array(_) => self.flatten_element(data, 0, row),
            MapperNode::Value(_) => {
                if let Some((column, value)) = flatten_value(&self.mapping, &self.visitor, data) {
                    row.insert(column, value);
                }
            }
        }
    }

    fn flatten_element(&self, data: &Value, position: usize, row: &mut IndexMap<String, String>) {
        if let MapperNode::Array(item) = &self.node {
            if let Some(element) = data.as_array().and_then(|items| items.get(position)) {
                item.flatten_into(element, row);
            }
        }
    }

    /// Map every row, attaching validation errors instead of failing.
    pub fn map_rows<'a, R, I>(
        &'a self,
        rows: I,
        validator: Option<&'a dyn DocumentValidator>,
    ) -> impl Iterator<Item = MappedRow> + 'a
    where
        R: Record + 'a,
        I: IntoIterator<Item = R>,
        I::IntoIter: 'a,
    {
        rows.into_iter().enumerate().map(move |(index, row)| {
            let mapped = self.map_row(&row, validator);
            trace!("Mapped row {} with {} validation errors", index, mapped.errors.len());
            mapped
        })
    }

    /// Map a single row and validate the result.
    pub fn map_row(&self, row: &dyn Record, validator: Option<&dyn DocumentValidator>) -> MappedRow {
        let (_, data) = self.apply(row);
        let errors = validator.map(|v| v.validate(&data)).unwrap_or_default();
        MappedRow { data, errors }
    }
}

/// Merge the target of a mapping's `$ref` into a copy of the mapping.
fn resolve_mapping(
    mapping: &Value,
    resolver: &dyn RefResolver,
    scope: Option<&str>,
) -> Result<Value, MappingError> {
    let Some(reference) = mapping.get("$ref").and_then(Value::as_str) else {
        return Ok(mapping.clone());
    };
    let resolved = resolver.resolve(scope, reference)?;
    let mut merged = mapping.as_object().cloned().unwrap_or_default();
    merged.remove("$ref");
    match resolved.document {
        Value::Object(target) => merged.extend(target),
        other => {
            return Err(MappingError::InvalidSchema {
                path: resolved.uri,
                found: other.to_string(),
            });
        }
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::SchemaStore;
    use serde_json::json;

    fn mapper(mapping: Value) -> Mapper {
        Mapper::new(&mapping, Arc::new(SchemaStore::default()), None).unwrap()
    }

    #[test]
    fn test_leaf_mapping_empty_and_present() {
        let m = mapper(json!({"column": "name", "schema": {"type": "string"}}));
        assert_eq!(m.apply(&json!({"name": ""})), (true, Value::Null));
        assert_eq!(m.apply(&json!({"name": "Ada"})), (false, json!("Ada")));
        assert_eq!(m.apply(&json!({})), (true, Value::Null));
    }

    #[test]
    fn test_leaf_default_substitution() {
        let m = mapper(json!({
            "column": "name",
            "default": "Anonymous",
            "schema": {"type": "string", "default": "Nobody"}
        }));
        assert_eq!(m.apply(&json!({"name": " "})), (true, json!("Anonymous")));

        let m = mapper(json!({"column": "name", "schema": {"type": "string", "default": "Nobody"}}));
        assert_eq!(m.apply(&json!({})), (true, json!("Nobody")));
    }

    #[test]
    fn test_join_columns() {
        let m = mapper(json!({
            "columns": ["first", "last"],
            "transforms": ["join"],
            "schema": {"type": "string"}
        }));
        assert_eq!(
            m.apply(&json!({"first": "Ada", "last": "Lovelace"})),
            (false, json!("Ada Lovelace"))
        );
    }

    #[test]
    fn test_format_template() {
        let m = mapper(json!({
            "columns": ["kind", "slug"],
            "format": "popolo:%s:%s",
            "schema": {"type": "string"}
        }));
        assert_eq!(
            m.apply(&json!({"kind": "person", "slug": "ada"})).1,
            json!("popolo:person:ada")
        );
    }

    #[test]
    fn test_leaf_coercion() {
        let m = mapper(json!({"column": "age", "schema": {"type": "integer"}}));
        assert_eq!(m.apply(&json!({"age": "36"})), (false, json!(36)));
        assert_eq!(m.apply(&json!({"age": "unknown"})), (false, json!("unknown")));
        assert_eq!(
            m.apply(&json!({"age": "99999999999999999999"})),
            (false, json!("99999999999999999999"))
        );
    }

    #[test]
    fn test_object_root_carries_schema_path() {
        let m = mapper(json!({
            "schema": {
                "id": "urn:person",
                "type": "object",
                "properties": {"name": {"type": "string"}}
            },
            "mapping": {"name": {"column": "n"}}
        }));
        let (empty, doc) = m.apply(&json!({"n": "Ada"}));
        assert!(!empty);
        assert_eq!(doc, json!({"$schema": "urn:person", "name": "Ada"}));
    }

    #[test]
    fn test_optional_branch_is_omitted() {
        let m = mapper(json!({
            "schema": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "contact": {
                        "type": "object",
                        "properties": {"email": {"type": "string"}, "phone": {"type": "string"}}
                    }
                }
            },
            "mapping": {
                "name": {"column": "name"},
                "contact": {
                    "optional": true,
                    "mapping": {
                        "email": {"column": "email", "optional": true},
                        "phone": {"column": "phone", "optional": true}
                    }
                }
            }
        }));
        let (empty, doc) = m.apply(&json!({"name": "Ada"}));
        assert!(!empty);
        assert!(doc.get("contact").is_none());

        let (_, doc) = m.apply(&json!({"name": "Ada", "phone": "555"}));
        assert_eq!(doc["contact"], json!({"phone": "555"}));
    }

    #[test]
    fn test_empty_object_is_reported_empty() {
        let m = mapper(json!({
            "schema": {"type": "object", "properties": {"a": {"type": "string"}}},
            "mapping": {"a": {"column": "a", "optional": true}}
        }));
        let (empty, doc) = m.apply(&json!({}));
        assert!(empty);
        assert_eq!(doc, json!({"$schema": null}));
    }

    #[test]
    fn test_multiple_entries_append_to_array() {
        let m = mapper(json!({
            "schema": {
                "type": "object",
                "properties": {
                    "links": {
                        "type": "array",
                        "items": {"type": "object", "properties": {"url": {"type": "string"}}}
                    }
                }
            },
            "mapping": {
                "links": [
                    {"optional": true, "mapping": {"url": {"column": "home"}}},
                    {"optional": true, "mapping": {"url": {"column": "wiki"}}}
                ]
            }
        }));
        let (_, doc) = m.apply(&json!({"home": "https://a.example", "wiki": "https://b.example"}));
        assert_eq!(
            doc["links"],
            json!([{"url": "https://a.example"}, {"url": "https://b.example"}])
        );

        let (_, doc) = m.apply(&json!({"wiki": "https://b.example"}));
        assert_eq!(doc["links"], json!([{"url": "https://b.example"}]));
    }

    #[test]
    fn test_flatten_skipped_entry_keeps_shape() {
        let m = mapper(json!({
            "schema": {
                "type": "object",
                "properties": {
                    "links": {
                        "type": "array",
                        "items": {"type": "object", "properties": {"url": {"type": "string"}}}
                    }
                }
            },
            "mapping": {
                "links": [
                    {"optional": true, "mapping": {"url": {"column": "home"}}},
                    {"optional": true, "mapping": {"url": {"column": "wiki"}}}
                ]
            }
        }));
        let (_, doc) = m.apply(&json!({"wiki": "W"}));
        let flat = m.flatten(&doc);
        // The only element lands on the first entry's column.
        assert_eq!(flat.get("home").map(String::as_str), Some("W"));
        assert!(!flat.contains_key("wiki"));

        let (_, again) = m.apply(&flat);
        assert_eq!(again, doc);
    }

    #[test]
    fn test_unknown_property_is_ignored() {
        let m = mapper(json!({
            "schema": {"type": "object", "properties": {"a": {"type": "string"}}},
            "mapping": {"a": {"column": "a"}, "b": {"column": "b"}}
        }));
        assert_eq!(m.children().len(), 1);
    }

    #[test]
    fn test_invalid_mapping_is_fatal() {
        let err = Mapper::new(
            &json!({"schema": {"type": "string"}, "column": "a", "transforms": ["rot13"]}),
            Arc::new(SchemaStore::default()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MappingError::InvalidMapping { .. }));
    }

    #[test]
    fn test_missing_schema_is_fatal() {
        let err = Mapper::new(&json!({"column": "a"}), Arc::new(SchemaStore::default()), None)
            .unwrap_err();
        assert!(matches!(err, MappingError::MissingSchema(_)));
    }

    #[test]
    fn test_mapping_reference_resolved() {
        let store = SchemaStore::new(None);
        store.insert(
            "urn:mappings",
            json!({"definitions": {"name": {"column": "full_name", "transforms": ["strip"]}}}),
        );
        let m = Mapper::new(
            &json!({
                "schema": {"type": "object", "properties": {"name": {"type": "string"}}},
                "mapping": {"name": {"$ref": "#/definitions/name"}}
            }),
            Arc::new(store),
            Some("urn:mappings"),
        )
        .unwrap();
        let (_, doc) = m.apply(&json!({"full_name": "  Ada "}));
        assert_eq!(doc["name"], json!("Ada"));
    }

    #[test]
    fn test_flatten_reverses_nesting() {
        let m = mapper(json!({
            "schema": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "born": {"type": "integer"},
                    "links": {
                        "type": "array",
                        "items": {"type": "object", "properties": {"url": {"type": "string"}}}
                    }
                }
            },
            "mapping": {
                "name": {"column": "name"},
                "born": {"column": "born", "dump": "birth_year"},
                "links": [
                    {"mapping": {"url": {"column": "home"}}},
                    {"mapping": {"url": {"column": "wiki"}}}
                ]
            }
        }));
        let (_, doc) = m.apply(&json!({"name": "Ada", "born": "1815", "home": "h", "wiki": "w"}));
        let flat = m.flatten(&doc);
        assert_eq!(flat["name"], "Ada");
        assert_eq!(flat["birth_year"], "1815");
        assert_eq!(flat["home"], "h");
        assert_eq!(flat["wiki"], "w");
    }
}
