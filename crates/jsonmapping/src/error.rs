//! Error types for the jsonmapping crate

use thiserror::Error;

/// Errors raised while resolving a `$ref` or loading schema documents.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// No stored document answers to the reference
    #[error("Unresolvable reference: {reference}")]
    Unresolvable { reference: String },

    /// The reference could not be joined against the active scope
    #[error("Invalid reference {reference} in scope {scope}: {reason}")]
    InvalidReference {
        reference: String,
        scope: String,
        reason: String,
    },

    /// The fragment of the reference does not point into the document
    #[error("Fragment #{fragment} not found in {uri}")]
    FragmentNotFound { uri: String, fragment: String },

    /// A schema file could not be read or parsed
    #[error("Failed to load schema {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Errors that can occur while building or running a mapping.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A schema or mapping reference could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The `type` keyword is neither a string nor an array of strings
    #[error("Invalid type declaration at {path}: {found}")]
    InvalidType { path: String, found: String },

    /// A schema fragment is not a JSON object
    #[error("Invalid schema at {path}: expected an object, found {found}")]
    InvalidSchema { path: String, found: String },

    /// The mapping description was rejected by the mapping meta-schema
    #[error("Invalid mapping: {}", errors.join("; "))]
    InvalidMapping { errors: Vec<String> },

    /// The mapping description has the right shape but unusable content
    #[error("Malformed mapping: {0}")]
    MalformedMapping(#[from] serde_json::Error),

    /// No schema was given for a root mapping or network entity
    #[error("No schema defined for {0}")]
    MissingSchema(&'static str),

    /// A transform name is not registered
    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    /// A schema could not be compiled for validation
    #[error("Invalid validation schema: {0}")]
    InvalidValidationSchema(String),
}

/// A value could not be coerced to the type its schema asks for.
///
/// Coercion is permissive: callers fall back to the untyped value.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot convert {value} to {type_name}")]
pub struct CoercionError {
    pub type_name: &'static str,
    pub value: String,
}
