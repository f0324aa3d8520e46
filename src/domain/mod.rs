//! Domain model: documents, field schemas, and query parameter types.

pub mod document;
pub mod error;
pub mod query;
pub mod schema;

pub use document::Document;
pub use error::DomainError;
pub use query::{QueryParams, QueryValue};
pub use schema::{FieldSpec, FieldType, Schema, SchemaCatalog};
