//! Quad projection of mapped documents
//!
//! [`SchemaVisitor::triplify`] flattens a document into `(subject,
//! predicate, object, context)` statements; [`SchemaVisitor::objectify`]
//! rebuilds a document from a statement store, bounded by a depth and
//! guarded against reference cycles.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::MappingError;
use crate::value::{text, type_name};
use crate::visitor::{SchemaKind, SchemaVisitor};

/// Context of the statement recording an entity's schema path.
pub const TYPE_SCHEMA: &str = "$schema";

/// Context of statements connecting two entities.
pub const TYPE_LINK: &str = "link";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// [`TYPE_SCHEMA`], [`TYPE_LINK`], or the scalar type of `object`.
    pub context: String,
}

impl Statement {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            context: context.into(),
        }
    }
}

/// One `(predicate, object, source)` triple returned by an objectify loader
/// for a given subject.
pub type LoadedStatement = (String, String, String);

impl SchemaVisitor {
    /// Subject identifier of an object, minting a `urn:uuid:` when the
    /// subject field is missing or blank.
    pub fn get_subject(&self, data: &Value) -> String {
        data.get(self.rdf_subject())
            .filter(|value| is_truthy(value))
            .and_then(text)
            .unwrap_or_else(|| Uuid::new_v4().urn().to_string())
    }

    /// Statements for `data`, generated lazily in depth-first order.
    ///
    /// `parent` is the subject the document hangs off, if any.
    pub fn triplify<'a>(self: &Arc<Self>, data: &'a Value, parent: Option<&str>) -> Triples<'a> {
        Triples {
            stack: vec![Frame {
                visitor: self.clone(),
                data,
                parent: parent.map(str::to_string),
            }],
            pending: Vec::new(),
        }
    }

    /// Rebuild the document for `node` from statements returned by `load`.
    ///
    /// Non-inline objects consume one level of `depth`; statements whose
    /// object already lies on the path from the root are skipped.
    pub fn objectify(
        self: &Arc<Self>,
        load: &dyn Fn(&str) -> Vec<LoadedStatement>,
        node: &str,
        depth: usize,
        path: &HashSet<String>,
    ) -> Result<Value, MappingError> {
        match self.kind() {
            SchemaKind::Value => Ok(Value::String(node.to_string())),
            SchemaKind::Array => match self.items()? {
                Some(items) => Ok(Value::Array(vec![items.objectify(load, node, depth, path)?])),
                None => Ok(Value::Array(Vec::new())),
            },
            SchemaKind::Object => {
                let next_depth = if self.is_inline() {
                    depth
                } else {
                    depth.saturating_sub(1)
                };
                let mut sub_path = path.clone();
                sub_path.insert(node.to_string());

                let mut obj = Map::new();
                obj.insert(
                    TYPE_SCHEMA.to_string(),
                    self.path().map_or(Value::Null, Value::from),
                );
                obj.insert("$sources".to_string(), Value::Array(Vec::new()));
                let mut sources: Vec<String> = Vec::new();

                for (predicate, object, source) in load(node) {
                    let Some(prop) = self.get_property(&predicate)? else {
                        continue;
                    };
                    if next_depth == 0 || path.contains(&object) {
                        debug!("Not following {} from {} to {}", predicate, node, object);
                        continue;
                    }
                    if !sources.contains(&source) {
                        sources.push(source);
                    }

                    let value = prop.objectify(load, &object, next_depth, &sub_path)?;
                    let name = prop.name().unwrap_or_default();
                    match obj.get_mut(name) {
                        Some(Value::Array(existing)) if prop.is_array() => {
                            if let Value::Array(items) = value {
                                existing.extend(items);
                            }
                        }
                        _ => {
                            obj.insert(name.to_string(), value);
                        }
                    }
                }
                obj.insert(
                    "$sources".to_string(),
                    Value::Array(sources.into_iter().map(Value::String).collect()),
                );
                Ok(Value::Object(obj))
            }
        }
    }
}

/// Lazy statement stream returned by [`SchemaVisitor::triplify`].
///
/// Stops after the first error.
pub struct Triples<'a> {
    stack: Vec<Frame<'a>>,
    /// Statements of the current node, in reverse emission order.
    pending: Vec<Statement>,
}

struct Frame<'a> {
    visitor: Arc<SchemaVisitor>,
    data: &'a Value,
    parent: Option<String>,
}

impl<'a> Triples<'a> {
    fn expand(&mut self, frame: Frame<'a>) -> Result<(), MappingError> {
        let Frame {
            visitor,
            data,
            parent,
        } = frame;
        if data.is_null() {
            return Ok(());
        }

        let mut emitted = Vec::new();
        match visitor.kind() {
            SchemaKind::Object => {
                let subject = visitor.get_subject(data);
                if let Some(path) = visitor.path() {
                    emitted.push(Statement::new(&subject, TYPE_SCHEMA, path, TYPE_SCHEMA));
                }
                if let Some(parent) = &parent {
                    emitted.push(Statement::new(parent, visitor.predicate(), &subject, TYPE_LINK));
                    if let Some(reverse) = visitor.reverse() {
                        emitted.push(Statement::new(&subject, reverse, parent, TYPE_LINK));
                    }
                }
                for prop in visitor.properties()?.iter().rev() {
                    let Some(value) = prop.name().and_then(|name| data.get(name)) else {
                        continue;
                    };
                    self.stack.push(Frame {
                        visitor: prop.clone(),
                        data: value,
                        parent: Some(subject.clone()),
                    });
                }
            }
            SchemaKind::Array => {
                if let (Some(items), Some(elements)) = (visitor.items()?, data.as_array()) {
                    for element in elements.iter().rev() {
                        self.stack.push(Frame {
                            visitor: items.clone(),
                            data: element,
                            parent: parent.clone(),
                        });
                    }
                }
            }
            SchemaKind::Value => {
                if let Some(parent) = parent {
                    emitted.push(Statement::new(
                        parent,
                        visitor.predicate(),
                        text(data).unwrap_or_default(),
                        type_name(data),
                    ));
                }
            }
        }
        emitted.reverse();
        self.pending = emitted;
        Ok(())
    }
}

impl Iterator for Triples<'_> {
    type Item = Result<Statement, MappingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(statement) = self.pending.pop() {
                return Some(Ok(statement));
            }
            let frame = self.stack.pop()?;
            if let Err(e) = self.expand(frame) {
                self.stack.clear();
                return Some(Err(e));
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
