//! Document store contract shared by the Postgres and in-memory
//! backends.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Document, DomainError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{message}")]
    Validation { message: String },
    #[error("duplicate value for unique field `{field}`")]
    UniqueViolation { field: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("store timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownKind { .. } => StoreError::InvalidInput {
                message: err.to_string(),
            },
            DomainError::Validation { .. } => StoreError::Validation {
                message: err.to_string(),
            },
        }
    }
}

/// Comparison applied to one payload field. Values arrive as the raw
/// query strings; each backend coerces them using the field's schema
/// type before comparing.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    Eq(String),
    AnyOf(Vec<String>),
    Gt(String),
    Gte(String),
    Lt(String),
    Lte(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub predicate: FilterPredicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Fully resolved list query: filters, sort order, optional field
/// projection, and an absolute window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortKey>,
    pub projection: Option<Vec<String>>,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Reference expansion applied on reads: the named field's ids are
/// replaced with embedded documents carrying the selected fields
/// (plus id). One level deep, by construction.
#[derive(Debug, Clone, Copy)]
pub struct Expansion {
    pub path: &'static str,
    pub select: &'static [&'static str],
}

impl Expansion {
    pub const fn new(path: &'static str, select: &'static [&'static str]) -> Self {
        Self { path, select }
    }
}

/// Persistence contract for schema-validated documents.
///
/// Ids are opaque strings at this boundary; a backend that cannot
/// parse one reports the document as absent rather than failing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(
        &self,
        kind: &str,
        payload: &Map<String, Value>,
    ) -> Result<Document, StoreError>;

    async fn find_by_id(
        &self,
        kind: &str,
        id: &str,
        expansions: &[Expansion],
    ) -> Result<Option<Document>, StoreError>;

    async fn find(
        &self,
        kind: &str,
        query: &DocumentQuery,
        expansions: &[Expansion],
    ) -> Result<Vec<Document>, StoreError>;

    async fn update(
        &self,
        kind: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Option<Document>, StoreError>;

    async fn delete(&self, kind: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn health(&self) -> Result<(), StoreError>;
}

/// Gather the distinct ids a reference field points at across a batch
/// of documents, so a backend can resolve them in one lookup.
pub(crate) fn collect_reference_ids(docs: &[Document], path: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for doc in docs {
        match doc.fields.get(path) {
            Some(Value::String(id)) => ids.push(id.clone()),
            Some(Value::Array(items)) => {
                ids.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                );
            }
            _ => {}
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

/// Swap reference ids on one document for their resolved embeds. A
/// single reference that resolved to nothing becomes null; unresolved
/// list members are dropped.
pub(crate) fn embed_resolved(doc: &mut Document, path: &str, resolved: &HashMap<String, Value>) {
    let Some(current) = doc.fields.get_mut(path) else {
        return;
    };
    match current {
        Value::String(id) => {
            *current = resolved.get(id.as_str()).cloned().unwrap_or(Value::Null);
        }
        Value::Array(items) => {
            let embedded: Vec<Value> = items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|id| resolved.get(id).cloned())
                .collect();
            *current = Value::Array(embedded);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_with(fields: Value) -> Document {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        Document::new("Order", "o1".to_string(), fields)
    }

    #[test]
    fn collects_distinct_ids_from_scalars_and_lists() {
        let docs = vec![
            doc_with(json!({"customer": "c1", "products": ["p1", "p2"]})),
            doc_with(json!({"customer": "c2", "products": ["p2"]})),
        ];
        assert_eq!(collect_reference_ids(&docs, "customer"), vec!["c1", "c2"]);
        assert_eq!(collect_reference_ids(&docs, "products"), vec!["p1", "p2"]);
        assert!(collect_reference_ids(&docs, "missing").is_empty());
    }

    #[test]
    fn embeds_resolved_references() {
        let mut doc = doc_with(json!({"customer": "c1", "products": ["p1", "p9"]}));
        let mut resolved = HashMap::new();
        resolved.insert("c1".to_string(), json!({"id": "c1", "email": "a@b.c"}));
        embed_resolved(&mut doc, "customer", &resolved);
        assert_eq!(doc.fields["customer"], json!({"id": "c1", "email": "a@b.c"}));

        let mut products = HashMap::new();
        products.insert("p1".to_string(), json!({"id": "p1", "name": "Lamp"}));
        embed_resolved(&mut doc, "products", &products);
        // p9 no longer exists, so it disappears from the embedded list.
        assert_eq!(doc.fields["products"], json!([{"id": "p1", "name": "Lamp"}]));
    }

    #[test]
    fn unresolved_single_reference_becomes_null() {
        let mut doc = doc_with(json!({"customer": "ghost"}));
        embed_resolved(&mut doc, "customer", &HashMap::new());
        assert_eq!(doc.fields["customer"], Value::Null);
    }
}
