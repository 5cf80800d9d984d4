//! Validation of produced documents

use jsonschema::{Draft, Validator};
use serde_json::Value;

use crate::error::MappingError;
use crate::mapper::Mapper;
use crate::resolver::{SchemaStore, schema_id};

/// Checks a produced document, returning one message per violation.
pub trait DocumentValidator: Send + Sync {
    fn validate(&self, document: &Value) -> Vec<String>;
}

/// Draft 4 validator with every document of a [`SchemaStore`] registered
/// as a resource, so cross-document `$ref`s resolve without retrieval.
pub struct SchemaValidator {
    validator: Validator,
}

impl SchemaValidator {
    pub fn new(schema: &Value, store: &SchemaStore) -> Result<Self, MappingError> {
        let own_uri = schema_id(schema).map(|id| id.trim_end_matches('#'));
        let mut options = jsonschema::options().with_draft(Draft::Draft4);
        for (uri, document) in store.documents() {
            if own_uri == Some(uri.as_str()) {
                continue;
            }
            options =
                options.with_resource(uri, Draft::Draft4.create_resource(document.as_ref().clone()));
        }
        let validator = options
            .build(schema)
            .map_err(|e| MappingError::InvalidValidationSchema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Validator for the documents produced by `mapper`.
    pub fn for_mapper(mapper: &Mapper, store: &SchemaStore) -> Result<Self, MappingError> {
        Self::new(&Value::Object(mapper.visitor().schema().clone()), store)
    }
}

impl DocumentValidator for SchemaValidator {
    fn validate(&self, document: &Value) -> Vec<String> {
        self.validator
            .iter_errors(document)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect()
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}
