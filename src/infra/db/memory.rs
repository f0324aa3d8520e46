//! In-memory document store.
//!
//! Serves development without Postgres and backs the test suite. One
//! ordered map per kind behind a process-wide lock; filter, sort, and
//! window semantics mirror the Postgres backend, including typed
//! comparison of payload fields and missing-field documents sorting
//! last in both directions.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::store::{
    DocumentQuery, DocumentStore, Expansion, FieldFilter, FilterPredicate, StoreError,
    collect_reference_ids, embed_resolved,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::{Document, FieldType, Schema, SchemaCatalog};

const TARGET: &str = "db.memory";

type Collections = HashMap<String, BTreeMap<String, Document>>;

pub struct MemoryDocumentStore {
    schemas: Arc<SchemaCatalog>,
    collections: RwLock<Collections>,
}

impl MemoryDocumentStore {
    pub fn new(schemas: Arc<SchemaCatalog>) -> Self {
        Self {
            schemas,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn expand_docs(
        collections: &Collections,
        schema: &Schema,
        docs: &mut [Document],
        expansions: &[Expansion],
    ) {
        for expansion in expansions {
            let Some(target) = schema
                .field(expansion.path)
                .and_then(|spec| spec.reference_target())
            else {
                continue;
            };
            let ids = collect_reference_ids(docs, expansion.path);
            if ids.is_empty() {
                continue;
            }
            let empty = BTreeMap::new();
            let collection = collections.get(target).unwrap_or(&empty);
            let resolved: HashMap<String, Value> = ids
                .into_iter()
                .filter_map(|id| {
                    collection
                        .get(&id)
                        .map(|doc| doc.to_embedded_value(expansion.select))
                        .map(|embedded| (id, embedded))
                })
                .collect();
            for doc in docs.iter_mut() {
                embed_resolved(doc, expansion.path, &resolved);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(
        &self,
        kind: &str,
        payload: &Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let schema = self.schemas.require(kind)?;
        let fields = schema.validate_create(payload)?;

        let mut collections = rw_write(&self.collections, TARGET, "create");
        let collection = collections.entry(kind.to_string()).or_default();
        if let Some(field) = unique_clash(collection, schema, &fields, None) {
            return Err(StoreError::UniqueViolation {
                field: field.to_string(),
            });
        }
        let doc = Document::new(kind, Uuid::new_v4().to_string(), fields);
        collection.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn find_by_id(
        &self,
        kind: &str,
        id: &str,
        expansions: &[Expansion],
    ) -> Result<Option<Document>, StoreError> {
        let schema = self.schemas.require(kind)?;
        let collections = rw_read(&self.collections, TARGET, "find_by_id");
        let Some(doc) = collections.get(kind).and_then(|c| c.get(id)) else {
            return Ok(None);
        };
        let mut docs = vec![doc.clone()];
        Self::expand_docs(&collections, schema, &mut docs, expansions);
        Ok(docs.pop())
    }

    async fn find(
        &self,
        kind: &str,
        query: &DocumentQuery,
        expansions: &[Expansion],
    ) -> Result<Vec<Document>, StoreError> {
        let schema = self.schemas.require(kind)?;
        let collections = rw_read(&self.collections, TARGET, "find");

        let mut docs: Vec<Document> = collections
            .get(kind)
            .map(|collection| {
                collection
                    .values()
                    .filter(|doc| query.filters.iter().all(|f| matches(doc, schema, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        docs.sort_by(|a, b| {
            for key in &query.sort {
                let ord = match (
                    comparable_of(a, schema, &key.field),
                    comparable_of(b, schema, &key.field),
                ) {
                    (Some(left), Some(right)) => {
                        let ord = compare_values(&left, &right);
                        if key.descending { ord.reverse() } else { ord }
                    }
                    // Missing values sort last regardless of direction.
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let take = query
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(take).collect();

        Self::expand_docs(&collections, schema, &mut docs, expansions);
        if let Some(projection) = &query.projection {
            for doc in &mut docs {
                doc.project(projection);
            }
        }
        Ok(docs)
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let schema = self.schemas.require(kind)?;
        let changes = schema.validate_update(patch)?;

        let mut collections = rw_write(&self.collections, TARGET, "update");
        let collection = collections.entry(kind.to_string()).or_default();
        let Some(existing) = collection.get(id) else {
            return Ok(None);
        };

        let mut fields = existing.fields.clone();
        for (name, value) in changes {
            if value.is_null() {
                fields.remove(&name);
            } else {
                fields.insert(name, value);
            }
        }
        if let Some(field) = unique_clash(collection, schema, &fields, Some(id)) {
            return Err(StoreError::UniqueViolation {
                field: field.to_string(),
            });
        }

        let mut doc = existing.clone();
        doc.fields = fields;
        doc.revision += 1;
        doc.updated_at = OffsetDateTime::now_utc();
        collection.insert(id.to_string(), doc.clone());
        Ok(Some(doc))
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.schemas.require(kind)?;
        let mut collections = rw_write(&self.collections, TARGET, "delete");
        Ok(collections
            .get_mut(kind)
            .and_then(|collection| collection.remove(id)))
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn unique_clash<'a>(
    collection: &BTreeMap<String, Document>,
    schema: &'a Schema,
    fields: &Map<String, Value>,
    exclude: Option<&str>,
) -> Option<&'a str> {
    for spec in schema.unique_fields() {
        let Some(candidate) = fields.get(spec.name()) else {
            continue;
        };
        if candidate.is_null() {
            continue;
        }
        let clash = collection.values().any(|doc| {
            exclude != Some(doc.id.as_str()) && doc.fields.get(spec.name()) == Some(candidate)
        });
        if clash {
            return Some(spec.name());
        }
    }
    None
}

/// A document value lifted into its schema type for comparison.
enum Comparable {
    Text(String),
    Number(f64),
    Boolean(bool),
    Timestamp(OffsetDateTime),
}

fn comparable_of(doc: &Document, schema: &Schema, field: &str) -> Option<Comparable> {
    match field {
        "id" => return Some(Comparable::Text(doc.id.clone())),
        "created_at" => return Some(Comparable::Timestamp(doc.created_at)),
        "updated_at" => return Some(Comparable::Timestamp(doc.updated_at)),
        _ => {}
    }
    let value = doc.fields.get(field)?;
    match schema.field(field).map(|spec| spec.field_type()) {
        Some(FieldType::Number) => value.as_f64().map(Comparable::Number),
        Some(FieldType::Boolean) => value.as_bool().map(Comparable::Boolean),
        Some(FieldType::Timestamp) => value
            .as_str()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
            .map(Comparable::Timestamp),
        _ => value.as_str().map(|raw| Comparable::Text(raw.to_string())),
    }
}

fn compare_values(left: &Comparable, right: &Comparable) -> Ordering {
    match (left, right) {
        (Comparable::Text(a), Comparable::Text(b)) => a.cmp(b),
        (Comparable::Number(a), Comparable::Number(b)) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Comparable::Boolean(a), Comparable::Boolean(b)) => a.cmp(b),
        (Comparable::Timestamp(a), Comparable::Timestamp(b)) => a.cmp(b),
        // Mixed types only occur when a payload disobeys its schema.
        _ => Ordering::Equal,
    }
}

/// Compare a document value against a raw query string, coercing the
/// string to the value's type. Uncoercible strings match nothing.
fn compare_with_raw(actual: &Comparable, raw: &str) -> Option<Ordering> {
    match actual {
        Comparable::Text(value) => Some(value.as_str().cmp(raw)),
        Comparable::Number(value) => raw
            .parse::<f64>()
            .ok()
            .and_then(|parsed| value.partial_cmp(&parsed)),
        Comparable::Boolean(value) => raw.parse::<bool>().ok().map(|parsed| value.cmp(&parsed)),
        Comparable::Timestamp(value) => OffsetDateTime::parse(raw, &Rfc3339)
            .ok()
            .map(|parsed| value.cmp(&parsed)),
    }
}

fn matches(doc: &Document, schema: &Schema, filter: &FieldFilter) -> bool {
    let Some(actual) = comparable_of(doc, schema, &filter.field) else {
        return false;
    };
    match &filter.predicate {
        FilterPredicate::Eq(raw) => compare_with_raw(&actual, raw) == Some(Ordering::Equal),
        FilterPredicate::AnyOf(raws) => raws
            .iter()
            .any(|raw| compare_with_raw(&actual, raw) == Some(Ordering::Equal)),
        FilterPredicate::Gt(raw) => compare_with_raw(&actual, raw) == Some(Ordering::Greater),
        FilterPredicate::Gte(raw) => matches!(
            compare_with_raw(&actual, raw),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterPredicate::Lt(raw) => compare_with_raw(&actual, raw) == Some(Ordering::Less),
        FilterPredicate::Lte(raw) => matches!(
            compare_with_raw(&actual, raw),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}
