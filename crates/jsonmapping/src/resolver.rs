//! Reference resolution for schemas and mapping descriptions
//!
//! The mapper never follows `$ref` on its own: every lookup goes through a
//! [`RefResolver`], evaluated inside the scope (base URI) that was active at
//! the node holding the reference. [`SchemaStore`] is an in-memory resolver
//! backed by a document cache that can be filled up front and then shared
//! read-only across threads.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::ResolveError;

/// A resolved reference: the canonical URI and a copy of the target schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub uri: String,
    pub document: Value,
}

/// Resolves `$ref` URIs against a scope.
///
/// `scope` plays the role of the innermost entry of a scope stack: the
/// lookup happens as if that scope had been pushed before and popped after
/// the call.
pub trait RefResolver: Send + Sync {
    fn resolve(&self, scope: Option<&str>, reference: &str) -> Result<Resolved, ResolveError>;
}

/// In-memory schema cache keyed by document URI (without fragment).
#[derive(Debug, Default)]
pub struct SchemaStore {
    base_uri: Option<String>,
    documents: RwLock<HashMap<String, Arc<Value>>>,
}

impl SchemaStore {
    pub fn new(base_uri: Option<&str>) -> Self {
        Self {
            base_uri: base_uri.map(str::to_string),
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Register `document` under `uri`. Any fragment in `uri` is ignored.
    pub fn insert(&self, uri: &str, document: Value) {
        let key = document_key(uri);
        debug!("Registering schema {}", key);
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(document));
    }

    /// Register a document under its own `id` (or `$id`).
    ///
    /// Returns the identifier used, or `None` if the document declares none.
    pub fn insert_identified(&self, document: Value) -> Option<String> {
        let id = schema_id(&document)?.to_string();
        self.insert(&id, document);
        Some(id)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&document_key(uri))
    }

    /// Snapshot of every stored document, keyed by URI.
    pub fn documents(&self) -> Vec<(String, Arc<Value>)> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = documents
            .iter()
            .map(|(uri, doc)| (uri.clone(), doc.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Load every `*.json` file in `dir`.
    ///
    /// Each document is registered under its `id`/`$id`, or under its
    /// `file://` URL when it declares none. Returns the registered URIs.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<String>, ResolveError> {
        let load_error = |path: &Path, reason: String| ResolveError::Load {
            path: path.display().to_string(),
            reason,
        };

        let entries = fs::read_dir(dir).map_err(|e| load_error(dir, e.to_string()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| load_error(dir, e.to_string()))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let text = fs::read_to_string(&path).map_err(|e| load_error(&path, e.to_string()))?;
            let document: Value =
                serde_json::from_str(&text).map_err(|e| load_error(&path, e.to_string()))?;
            let uri = match schema_id(&document) {
                Some(id) => id.to_string(),
                None => file_uri(&path).ok_or_else(|| {
                    load_error(&path, "cannot build a file URI for this path".to_string())
                })?,
            };
            self.insert(&uri, document);
            loaded.push(uri);
        }
        Ok(loaded)
    }

    fn lookup(&self, key: &str) -> Option<Arc<Value>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl RefResolver for SchemaStore {
    fn resolve(&self, scope: Option<&str>, reference: &str) -> Result<Resolved, ResolveError> {
        let uri = join_reference(scope.or(self.base_uri.as_deref()), reference)?;
        let (key, fragment) = split_fragment(&uri);
        let document = self
            .lookup(&document_key(key))
            .ok_or_else(|| ResolveError::Unresolvable {
                reference: uri.clone(),
            })?;

        let target = if fragment.is_empty() {
            document.as_ref().clone()
        } else {
            document
                .pointer(fragment)
                .cloned()
                .ok_or_else(|| ResolveError::FragmentNotFound {
                    uri: key.to_string(),
                    fragment: fragment.to_string(),
                })?
        };

        debug!("Resolved {} to {}", reference, uri);
        Ok(Resolved {
            uri,
            document: target,
        })
    }
}

/// The identifier a schema document declares for itself.
pub fn schema_id(document: &Value) -> Option<&str> {
    document
        .get("id")
        .or_else(|| document.get("$id"))
        .and_then(Value::as_str)
}

/// Join `reference` against `scope`, yielding an absolute URI when possible.
pub fn join_reference(scope: Option<&str>, reference: &str) -> Result<String, ResolveError> {
    if let Ok(absolute) = Url::parse(reference) {
        return Ok(absolute.to_string());
    }
    let Some(scope) = scope else {
        return Ok(reference.to_string());
    };
    match Url::parse(scope) {
        Ok(base) => base
            .join(reference)
            .map(|url| url.to_string())
            .map_err(|e| ResolveError::InvalidReference {
                reference: reference.to_string(),
                scope: scope.to_string(),
                reason: e.to_string(),
            }),
        // Scopes that are not URLs only support same-document references.
        Err(_) if reference.starts_with('#') => {
            Ok(format!("{}{}", split_fragment(scope).0, reference))
        }
        Err(_) => Ok(reference.to_string()),
    }
}

fn split_fragment(uri: &str) -> (&str, &str) {
    match uri.split_once('#') {
        Some((document, fragment)) => (document, fragment),
        None => (uri, ""),
    }
}

fn document_key(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => split_fragment(uri).0.to_string(),
    }
}

fn file_uri(path: &Path) -> Option<String> {
    let absolute = fs::canonicalize(path).ok()?;
    Url::from_file_path(absolute).ok().map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SchemaStore {
        let store = SchemaStore::new(None);
        store.insert(
            "http://example.com/schemas/person.json#",
            json!({
                "id": "http://example.com/schemas/person.json#",
                "type": "object",
                "definitions": {"name": {"type": "string"}}
            }),
        );
        store
    }

    #[test]
    fn test_resolve_absolute_reference() {
        let resolved = store()
            .resolve(None, "http://example.com/schemas/person.json#")
            .unwrap();
        assert_eq!(resolved.uri, "http://example.com/schemas/person.json#");
        assert_eq!(resolved.document["type"], "object");
    }

    #[test]
    fn test_resolve_relative_reference_in_scope() {
        let resolved = store()
            .resolve(Some("http://example.com/schemas/membership.json#"), "person.json#")
            .unwrap();
        assert_eq!(resolved.uri, "http://example.com/schemas/person.json#");
    }

    #[test]
    fn test_resolve_pointer_fragment() {
        let resolved = store()
            .resolve(
                Some("http://example.com/schemas/person.json#"),
                "#/definitions/name",
            )
            .unwrap();
        assert_eq!(resolved.document, json!({"type": "string"}));
    }

    #[test]
    fn test_missing_document_is_an_error() {
        let err = store()
            .resolve(None, "http://example.com/schemas/unknown.json#")
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolvable { .. }));
    }

    #[test]
    fn test_missing_fragment_is_an_error() {
        let err = store()
            .resolve(None, "http://example.com/schemas/person.json#/nope")
            .unwrap_err();
        assert!(matches!(err, ResolveError::FragmentNotFound { .. }));
    }

    #[test]
    fn test_non_url_scope_supports_local_fragments() {
        let store = SchemaStore::new(None);
        store.insert("mapping", json!({"definitions": {"x": {"column": "x"}}}));
        let resolved = store.resolve(Some("mapping"), "#/definitions/x").unwrap();
        assert_eq!(resolved.document, json!({"column": "x"}));
    }
}
