//! Node-link networks from mapped documents
//!
//! Schemas mark object positions with a `graph` role: `"node"` objects
//! become graph nodes keyed by their `id`, `"edge"` objects connect the
//! nodes they reference. The result is an undirected multigraph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::MappingError;
use crate::resolver::RefResolver;
use crate::value::text;
use crate::visitor::{GraphRole, SchemaKind, SchemaVisitor};

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkNode {
    pub id: String,
    /// Scalar properties of the entity.
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEdge {
    pub id: Option<String>,
    pub attributes: Map<String, Value>,
}

pub struct Network {
    resolver: Arc<dyn RefResolver>,
    graph: UnGraph<NetworkNode, NetworkEdge>,
    nodes: HashMap<String, NodeIndex>,
    edge_ids: HashSet<String>,
}

impl Network {
    pub fn new(resolver: Arc<dyn RefResolver>) -> Self {
        Self {
            resolver,
            graph: UnGraph::default(),
            nodes: HashMap::new(),
            edge_ids: HashSet::new(),
        }
    }

    pub fn graph(&self) -> &UnGraph<NetworkNode, NetworkEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add the nodes and edges found in `entity`.
    ///
    /// `schema` may be a schema or a schema URI; without it the entity's
    /// own `$schema` is used.
    pub fn add(&mut self, entity: &Value, schema: Option<&Value>) -> Result<(), MappingError> {
        let schema = match schema.or_else(|| entity.get("$schema")) {
            Some(Value::String(uri)) => json!({"$ref": uri}),
            Some(schema) if !schema.is_null() => schema.clone(),
            _ => return Err(MappingError::MissingSchema("network entity")),
        };
        let visitor = SchemaVisitor::new(&schema, self.resolver.clone(), None)?;
        self.add_entity(entity, &visitor, None)
    }

    fn add_entity(
        &mut self,
        entity: &Value,
        visitor: &Arc<SchemaVisitor>,
        parent: Option<&str>,
    ) -> Result<(), MappingError> {
        match visitor.kind() {
            SchemaKind::Object => {
                let Some(object) = entity.as_object() else {
                    return Ok(());
                };
                let entity_id = object.get("id").and_then(text);

                match visitor.graph() {
                    Some(GraphRole::Node) => match &entity_id {
                        Some(id) => {
                            let attributes = simple_object(object, visitor)?;
                            self.ensure_node(id, attributes);
                        }
                        None => debug!("Skipping node without id at {:?}", visitor.path()),
                    },
                    Some(GraphRole::Edge) => {
                        if let Some((source, target)) = self.edge_endpoints(object, visitor, parent)? {
                            let fresh = entity_id
                                .as_ref()
                                .is_none_or(|id| self.edge_ids.insert(id.clone()));
                            if fresh {
                                let edge = NetworkEdge {
                                    id: entity_id.clone(),
                                    attributes: simple_object(object, visitor)?,
                                };
                                self.graph.add_edge(source, target, edge);
                            }
                        }
                    }
                    None => {}
                }

                for prop in visitor.properties()? {
                    if let Some(value) = prop.name().and_then(|name| object.get(name)) {
                        self.add_entity(value, prop, entity_id.as_deref())?;
                    }
                }
            }
            SchemaKind::Array => {
                if let (Some(items), Some(elements)) = (visitor.items()?, entity.as_array()) {
                    for element in elements {
                        self.add_entity(element, items, parent)?;
                    }
                }
            }
            SchemaKind::Value => {}
        }
        Ok(())
    }

    /// The two nodes an edge entity connects: the first two distinct
    /// node-role properties, or the enclosing entity and the first one.
    fn edge_endpoints(
        &mut self,
        entity: &Map<String, Value>,
        visitor: &Arc<SchemaVisitor>,
        parent: Option<&str>,
    ) -> Result<Option<(NodeIndex, NodeIndex)>, MappingError> {
        let mut source = parent.map(str::to_string);
        for prop in visitor.properties()? {
            if prop.graph() != Some(GraphRole::Node) {
                continue;
            }
            let Some(data) = prop
                .name()
                .and_then(|name| entity.get(name))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let Some(data_id) = data.get("id").and_then(text) else {
                continue;
            };
            let attributes = simple_object(data, prop)?;
            self.ensure_node(&data_id, attributes);

            match source {
                None => source = Some(data_id),
                Some(source_id) if source_id != data_id => {
                    let (high, low) = if source_id > data_id {
                        (source_id, data_id)
                    } else {
                        (data_id, source_id)
                    };
                    let high = self.ensure_node(&high, Map::new());
                    let low = self.ensure_node(&low, Map::new());
                    return Ok(Some((high, low)));
                }
                Some(_) => {}
            }
        }
        warn!(
            "Dangling edge {}: source {}",
            entity.get("id").and_then(text).unwrap_or_default(),
            source.as_deref().unwrap_or("<none>")
        );
        Ok(None)
    }

    fn ensure_node(&mut self, id: &str, attributes: Map<String, Value>) -> NodeIndex {
        if let Some(index) = self.nodes.get(id) {
            return *index;
        }
        let index = self.graph.add_node(NetworkNode {
            id: id.to_string(),
            attributes,
        });
        self.nodes.insert(id.to_string(), index);
        index
    }

    /// Serialize as node-link JSON, links referring to nodes by id.
    pub fn to_node_link(&self) -> Value {
        let nodes: Vec<Value> = self
            .graph
            .node_weights()
            .map(|node| {
                let mut obj = Map::new();
                obj.insert("id".to_string(), Value::String(node.id.clone()));
                obj.extend(node.attributes.clone());
                Value::Object(obj)
            })
            .collect();

        let mut keys: HashMap<(NodeIndex, NodeIndex), usize> = HashMap::new();
        let links: Vec<Value> = self
            .graph
            .edge_references()
            .map(|edge| {
                let key = keys.entry((edge.source(), edge.target())).or_default();
                let mut obj = edge.weight().attributes.clone();
                obj.insert("source".to_string(), Value::String(self.graph[edge.source()].id.clone()));
                obj.insert("target".to_string(), Value::String(self.graph[edge.target()].id.clone()));
                obj.insert("key".to_string(), Value::from(*key));
                *key += 1;
                Value::Object(obj)
            })
            .collect();

        json!({
            "directed": false,
            "multigraph": true,
            "graph": {},
            "nodes": nodes,
            "links": links,
        })
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

/// The scalar properties of an entity.
fn simple_object(
    entity: &Map<String, Value>,
    visitor: &Arc<SchemaVisitor>,
) -> Result<Map<String, Value>, MappingError> {
    let mut data = Map::new();
    for prop in visitor.properties()? {
        if !prop.is_value() {
            continue;
        }
        if let Some((name, value)) = prop.name().and_then(|name| entity.get_key_value(name)) {
            data.insert(name.clone(), value.clone());
        }
    }
    Ok(data)
}
