//! Schema tree walker
//!
//! A [`SchemaVisitor`] is a view of one position in a JSON schema. It
//! resolves `$ref` through a [`RefResolver`], folds `anyOf`/`allOf`/`oneOf`
//! composition into a single list of properties and a single type set, and
//! classifies the position as an object, an array or a value.
//!
//! Trees are built top-down. Children are computed on first access and then
//! cached for the lifetime of the node; a child only holds a weak link back
//! to its parent, so dropping the root releases the whole tree.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};

use crate::error::MappingError;
use crate::resolver::RefResolver;

/// Composition keywords, in the order their properties are folded.
const INHERITANCE_RULES: [&str; 3] = ["anyOf", "allOf", "oneOf"];

/// Classification of a schema position. Exactly one applies to every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Object,
    Array,
    Value,
}

impl SchemaKind {
    fn from_types(types: &[String]) -> Self {
        if types.iter().any(|t| t == "object") {
            SchemaKind::Object
        } else if types.iter().any(|t| t == "array") {
            SchemaKind::Array
        } else {
            SchemaKind::Value
        }
    }
}

/// Role of an object schema in the node-link projection (`graph` keyword).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphRole {
    Node,
    Edge,
}

pub struct SchemaVisitor {
    schema: Map<String, Value>,
    resolver: Arc<dyn RefResolver>,
    name: Option<String>,
    parent: Weak<SchemaVisitor>,
    id: Option<String>,
    scope: Option<String>,
    path: Option<String>,
    /// Types declared by this fragment and its composed sub-schemas.
    declared_types: Vec<String>,
    types: Vec<String>,
    kind: SchemaKind,
    reverse: Option<String>,
    inherited: Vec<Arc<SchemaVisitor>>,
    properties: OnceCell<Vec<Arc<SchemaVisitor>>>,
    items: OnceCell<Arc<SchemaVisitor>>,
}

impl SchemaVisitor {
    /// Build the root of a schema tree.
    ///
    /// `schema` is never modified: a `$ref` is resolved into a private copy.
    pub fn new(
        schema: &Value,
        resolver: Arc<dyn RefResolver>,
        scope: Option<&str>,
    ) -> Result<Arc<Self>, MappingError> {
        Self::build(schema, resolver, None, None, scope)
    }

    fn build(
        schema: &Value,
        resolver: Arc<dyn RefResolver>,
        name: Option<&str>,
        parent: Option<&Arc<SchemaVisitor>>,
        scope: Option<&str>,
    ) -> Result<Arc<Self>, MappingError> {
        let parent_path = parent.and_then(|p| p.path.as_deref());
        let position = || child_path(parent_path, name).unwrap_or_else(|| "<root>".to_string());

        let mut fragment = match schema {
            Value::Object(map) => map.clone(),
            Value::Null | Value::Bool(true) => Map::new(),
            other => {
                return Err(MappingError::InvalidSchema {
                    path: position(),
                    found: other.to_string(),
                });
            }
        };

        // Follow exactly one indirection; a `$ref` inside the target stays inert.
        let mut resolved_uri = None;
        if let Some(reference) = fragment.remove("$ref") {
            let reference = reference.as_str().ok_or_else(|| MappingError::InvalidSchema {
                path: position(),
                found: format!("$ref {reference}"),
            })?;
            let resolved = resolver.resolve(scope, reference)?;
            match resolved.document {
                Value::Object(target) => fragment.extend(target),
                other => {
                    return Err(MappingError::InvalidSchema {
                        path: resolved.uri,
                        found: other.to_string(),
                    });
                }
            }
            resolved_uri = Some(resolved.uri);
        }

        let id = fragment
            .get("id")
            .or_else(|| fragment.get("$id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let scope = id
            .clone()
            .or(resolved_uri)
            .or_else(|| scope.map(str::to_string));
        let path = id.clone().or_else(|| child_path(parent_path, name));

        let mut declared_types = parse_types(&fragment, &position)?;
        let mut inherited = Vec::new();
        for rule in INHERITANCE_RULES {
            let Some(subs) = fragment.get(rule).and_then(Value::as_array) else {
                continue;
            };
            for sub in subs {
                let visitor = Self::build(sub, resolver.clone(), name, parent, scope.as_deref())?;
                for type_name in &visitor.declared_types {
                    if !declared_types.contains(type_name) {
                        declared_types.push(type_name.clone());
                    }
                }
                inherited.push(visitor);
            }
        }

        let types = if declared_types.is_empty() {
            vec!["object".to_string()]
        } else {
            declared_types.clone()
        };
        let kind = SchemaKind::from_types(&types);

        let reverse = match fragment.get("rdfReverse").and_then(Value::as_str) {
            Some(reverse) => Some(reverse.to_string()),
            None => parent
                .filter(|p| p.is_array())
                .and_then(|p| p.reverse.clone()),
        };

        Ok(Arc::new(SchemaVisitor {
            schema: fragment,
            resolver,
            name: name.map(str::to_string),
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            id,
            scope,
            path,
            declared_types,
            types,
            kind,
            reverse,
            inherited,
            properties: OnceCell::new(),
            items: OnceCell::new(),
        }))
    }

    /// The resolved schema fragment at this position.
    pub fn schema(&self) -> &Map<String, Value> {
        &self.schema
    }

    pub fn resolver(&self) -> &Arc<dyn RefResolver> {
        &self.resolver
    }

    /// Property key that reached this node; `None` at the root.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Nearest enclosing identifier, used to resolve relative references.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Stable pointer into the schema space, e.g. `person.json#/memberships`.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The enclosing node, if it is still alive.
    pub fn parent(&self) -> Option<Arc<SchemaVisitor>> {
        self.parent.upgrade()
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn is_object(&self) -> bool {
        self.kind == SchemaKind::Object
    }

    pub fn is_array(&self) -> bool {
        self.kind == SchemaKind::Array
    }

    pub fn is_value(&self) -> bool {
        self.kind == SchemaKind::Value
    }

    pub fn format(&self) -> Option<&str> {
        self.schema.get("format").and_then(Value::as_str)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.schema.get("default").filter(|v| !v.is_null())
    }

    pub fn sort_index(&self) -> i64 {
        self.schema
            .get("sortIndex")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    pub fn graph(&self) -> Option<GraphRole> {
        match self.schema.get("graph").and_then(Value::as_str) {
            Some("node") => Some(GraphRole::Node),
            Some("edge") => Some(GraphRole::Edge),
            _ => None,
        }
    }

    /// Inline nodes do not consume reconstruction depth in `objectify`.
    pub fn is_inline(&self) -> bool {
        self.is_value()
            || self
                .schema
                .get("inline")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Field holding an object's subject identifier (`rdfSubject`, default `id`).
    pub fn rdf_subject(&self) -> &str {
        self.schema
            .get("rdfSubject")
            .and_then(Value::as_str)
            .unwrap_or("id")
    }

    /// Predicate linking the parent to this node (`rdfName`, default the name).
    pub fn predicate(&self) -> &str {
        self.schema
            .get("rdfName")
            .and_then(Value::as_str)
            .or(self.name.as_deref())
            .unwrap_or_default()
    }

    /// Reverse predicate: `rdfReverse`, or the enclosing array's reverse.
    pub fn reverse(&self) -> Option<&str> {
        self.reverse.as_deref()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }

    /// Declared and inherited properties, ordered by `sortIndex` descending,
    /// then name, then identifier. Empty unless this is an object.
    ///
    /// `patternProperties` are not supported.
    pub fn properties(self: &Arc<Self>) -> Result<&[Arc<SchemaVisitor>], MappingError> {
        if !self.is_object() {
            return Ok(&[]);
        }
        let properties = self.properties.get_or_try_init(|| {
            let mut merged: IndexMap<String, Arc<SchemaVisitor>> = IndexMap::new();
            for base in &self.inherited {
                for prop in base.properties()? {
                    merged.insert(prop.name.clone().unwrap_or_default(), prop.clone());
                }
            }
            if let Some(declared) = self.schema.get("properties").and_then(Value::as_object) {
                for (name, schema) in declared {
                    let prop = Self::build(
                        schema,
                        self.resolver.clone(),
                        Some(name),
                        Some(self),
                        self.scope.as_deref(),
                    )?;
                    merged.insert(name.clone(), prop);
                }
            }
            let mut properties: Vec<_> = merged.into_values().collect();
            properties.sort_by(|a, b| compare_properties(a, b));
            Ok::<_, MappingError>(properties)
        })?;
        Ok(properties.as_slice())
    }

    /// Schema of array elements; `None` unless this is an array.
    pub fn items(self: &Arc<Self>) -> Result<Option<&Arc<SchemaVisitor>>, MappingError> {
        if !self.is_array() {
            return Ok(None);
        }
        let items = self.items.get_or_try_init(|| {
            let schema = match self.schema.get("items") {
                Some(Value::Array(tuple)) => tuple.first().cloned().unwrap_or(Value::Null),
                Some(schema) => schema.clone(),
                None => Value::Null,
            };
            Self::build(
                &schema,
                self.resolver.clone(),
                self.name.as_deref(),
                Some(self),
                self.scope.as_deref(),
            )
        })?;
        Ok(Some(items))
    }

    /// The property called `name`, if declared.
    pub fn get_property(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Option<&Arc<SchemaVisitor>>, MappingError> {
        Ok(self.properties()?.iter().find(|prop| prop.matches(name)))
    }
}

impl fmt::Debug for SchemaVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaVisitor")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("types", &self.types)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn compare_properties(a: &SchemaVisitor, b: &SchemaVisitor) -> Ordering {
    b.sort_index()
        .cmp(&a.sort_index())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

fn child_path(parent_path: Option<&str>, name: Option<&str>) -> Option<String> {
    let parent_path = parent_path?;
    Some(match name {
        Some(name) if parent_path.contains('#') => format!("{parent_path}/{name}"),
        Some(name) => format!("{parent_path}#/{name}"),
        None => parent_path.to_string(),
    })
}

fn parse_types(
    fragment: &Map<String, Value>,
    position: &dyn Fn() -> String,
) -> Result<Vec<String>, MappingError> {
    let invalid = |found: &Value| MappingError::InvalidType {
        path: position(),
        found: found.to_string(),
    };
    match fragment.get("type") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(type_name)) => Ok(vec![type_name.clone()]),
        Some(Value::Array(names)) => {
            let mut types: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                let name = name.as_str().ok_or_else(|| invalid(name))?;
                if !types.iter().any(|t| t == name) {
                    types.push(name.to_string());
                }
            }
            Ok(types)
        }
        Some(other) => Err(invalid(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::SchemaStore;
    use serde_json::json;

    fn resolver() -> Arc<dyn RefResolver> {
        let store = SchemaStore::new(None);
        store.insert(
            "http://example.com/entity.json#",
            json!({
                "id": "http://example.com/entity.json#",
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "name": {"type": "integer"}
                }
            }),
        );
        Arc::new(store)
    }

    fn visitor(schema: Value) -> Arc<SchemaVisitor> {
        SchemaVisitor::new(&schema, resolver(), None).unwrap()
    }

    fn names(visitor: &Arc<SchemaVisitor>) -> Vec<String> {
        visitor
            .properties()
            .unwrap()
            .iter()
            .map(|p| p.name().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_classification_is_exclusive() {
        for schema in [
            json!({"type": "object"}),
            json!({"type": "array"}),
            json!({"type": "string"}),
            json!({"type": ["string", "null"]}),
            json!({"type": ["array", "object"]}),
            json!({}),
        ] {
            let v = visitor(schema);
            let flags = [v.is_object(), v.is_array(), v.is_value()];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{v:?}");
        }
    }

    #[test]
    fn test_untyped_schema_defaults_to_object() {
        assert!(visitor(json!({})).is_object());
        assert!(visitor(json!({"type": ["array", "object"]})).is_object());
    }

    #[test]
    fn test_invalid_type_declaration() {
        let err = SchemaVisitor::new(&json!({"type": 7}), resolver(), None).unwrap_err();
        assert!(matches!(err, MappingError::InvalidType { .. }));
    }

    #[test]
    fn test_unresolved_reference_is_fatal() {
        let err = SchemaVisitor::new(
            &json!({"$ref": "http://example.com/missing.json#"}),
            resolver(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MappingError::Resolve(_)));
    }

    #[test]
    fn test_reference_does_not_mutate_input() {
        let schema = json!({"$ref": "http://example.com/entity.json#", "title": "Entity"});
        let before = schema.clone();
        let v = SchemaVisitor::new(&schema, resolver(), None).unwrap();
        assert_eq!(schema, before);
        assert_eq!(v.id(), Some("http://example.com/entity.json#"));
        assert_eq!(v.schema().get("title"), Some(&json!("Entity")));
        assert!(!v.schema().contains_key("$ref"));
    }

    #[test]
    fn test_properties_sorted_by_index_then_name() {
        let v = visitor(json!({
            "type": "object",
            "properties": {
                "zeta": {"type": "string"},
                "alpha": {"type": "string"},
                "top": {"type": "string", "sortIndex": 5},
                "bottom": {"type": "string", "sortIndex": -1}
            }
        }));
        assert_eq!(names(&v), ["top", "alpha", "zeta", "bottom"]);
    }

    #[test]
    fn test_property_order_ignores_declaration_order() {
        let a = visitor(json!({
            "type": "object",
            "properties": {"b": {"type": "string"}, "a": {"type": "string"}},
            "allOf": [{"properties": {"c": {"type": "string"}}}]
        }));
        let b = visitor(json!({
            "allOf": [{"properties": {"c": {"type": "string"}}}],
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "type": "object"
        }));
        assert_eq!(names(&a), names(&b));
        assert_eq!(names(&a), ["a", "b", "c"]);
    }

    #[test]
    fn test_composition_folds_properties_and_types() {
        let v = visitor(json!({
            "allOf": [{"$ref": "http://example.com/entity.json#"}],
            "properties": {"name": {"type": "string"}, "extra": {"type": "boolean"}}
        }));
        assert!(v.is_object());
        assert_eq!(names(&v), ["extra", "id", "name"]);
        let name = v.get_property("name").unwrap().unwrap();
        assert_eq!(name.types(), ["string"]);
    }

    #[test]
    fn test_identifier_breaks_name_ties() {
        let v = visitor(json!({
            "type": "object",
            "anyOf": [
                {"properties": {"name": {"id": "http://example.com/b.json#", "type": "string", "sortIndex": 1}}},
                {"properties": {"name": {"id": "http://example.com/a.json#", "type": "string", "sortIndex": 1}}}
            ]
        }));
        let first = v.inherited[0].get_property("name").unwrap().unwrap().clone();
        let second = v.inherited[1].get_property("name").unwrap().unwrap().clone();
        assert_eq!(compare_properties(&first, &second), Ordering::Greater);
        assert_eq!(compare_properties(&second, &first), Ordering::Less);

        // The later declaration of a name wins.
        assert_eq!(names(&v), ["name"]);
        let name = v.get_property("name").unwrap().unwrap();
        assert_eq!(name.id(), Some("http://example.com/a.json#"));
    }

    #[test]
    fn test_anyof_types_are_unioned() {
        let v = visitor(json!({"anyOf": [{"type": "string"}, {"type": "null"}]}));
        assert_eq!(v.types(), ["string", "null"]);
        assert!(v.is_value());
    }

    #[test]
    fn test_paths_and_scope() {
        let v = visitor(json!({
            "id": "http://example.com/person.json#",
            "type": "object",
            "properties": {
                "links": {"type": "array", "items": {"type": "object", "properties": {"url": {"type": "string"}}}}
            }
        }));
        let links = v.get_property("links").unwrap().unwrap().clone();
        assert_eq!(links.path(), Some("http://example.com/person.json#/links"));
        assert_eq!(links.scope(), Some("http://example.com/person.json#"));
        let item = links.items().unwrap().unwrap().clone();
        let url = item.get_property("url").unwrap().unwrap();
        assert_eq!(url.path(), Some("http://example.com/person.json#/links/links/url"));
        assert!(Arc::ptr_eq(&url.parent().unwrap(), &item));
    }

    #[test]
    fn test_path_without_fragment_gets_one() {
        let v = visitor(json!({"id": "urn:person", "properties": {"name": {"type": "string"}}}));
        let name = v.get_property("name").unwrap().unwrap();
        assert_eq!(name.path(), Some("urn:person#/name"));
    }

    #[test]
    fn test_children_are_memoized() {
        let v = visitor(json!({"properties": {"name": {"type": "string"}}}));
        let first = v.properties().unwrap()[0].clone();
        let second = v.properties().unwrap()[0].clone();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reverse_inherited_from_array() {
        let v = visitor(json!({
            "properties": {
                "children": {
                    "type": "array",
                    "rdfReverse": "parent",
                    "items": {"type": "object"}
                }
            }
        }));
        let children = v.get_property("children").unwrap().unwrap().clone();
        let item = children.items().unwrap().unwrap();
        assert_eq!(item.reverse(), Some("parent"));
    }
}
