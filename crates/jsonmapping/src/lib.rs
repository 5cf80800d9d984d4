//! Schema-driven mapping between flat records and nested JSON documents.
//!
//! A mapping description binds source columns to positions in a JSON schema.
//! [`Mapper`] applies it to flat records (CSV rows, database rows, any
//! [`Record`]) and produces nested documents, and writes documents back into
//! flat columns. Mapped documents can be projected into statements and
//! rebuilt from them, turned into a node-link network, or used to derive a
//! search-index mapping.
//!
//! # Modules
//!
//! - [`visitor`] - [`SchemaVisitor`], a lazily expanded view of a schema
//! - [`resolver`] - `$ref` resolution and the in-memory [`SchemaStore`]
//! - [`mapper`] - [`Mapper::apply`] and [`Mapper::flatten`]
//! - [`transforms`] - named value transforms chained per leaf
//! - [`value`] - leaf extraction and type coercion
//! - [`statements`] - [`SchemaVisitor::triplify`] and [`SchemaVisitor::objectify`]
//! - [`validate`] - validation of produced documents
//! - [`network`] - node-link graphs from `graph` annotations
//! - [`elastic`] - search-index mappings from schemas

pub mod description;
pub mod elastic;
pub mod error;
pub mod mapper;
pub mod network;
pub mod record;
pub mod resolver;
pub mod statements;
pub mod transforms;
pub mod validate;
pub mod value;
pub mod visitor;

pub use description::{MappingDescription, validate_mapping};
pub use error::{CoercionError, MappingError, ResolveError};
pub use mapper::{MappedRow, Mapper};
pub use network::Network;
pub use record::Record;
pub use resolver::{RefResolver, Resolved, SchemaStore};
pub use statements::{Statement, TYPE_LINK, TYPE_SCHEMA};
pub use validate::{DocumentValidator, SchemaValidator};
pub use visitor::{GraphRole, SchemaKind, SchemaVisitor};
