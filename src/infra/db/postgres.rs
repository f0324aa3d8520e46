//! Postgres document store.
//!
//! Documents live in one `documents` table with the payload in a
//! JSONB column. Filters and sorts against payload fields extract
//! with `->>` and cast according to the field's schema type, so
//! numeric and timestamp comparisons behave like typed columns. Field
//! names from the query string are always bound, never interpolated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::map_sqlx_error;
use crate::application::store::{
    DocumentQuery, DocumentStore, Expansion, FieldFilter, FilterPredicate, SortKey, StoreError,
    collect_reference_ids, embed_resolved,
};
use crate::domain::{Document, FieldType, Schema, SchemaCatalog};

const DOCUMENT_COLUMNS: &str = "id, kind, data, revision, created_at, updated_at";

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Arc<PgPool>,
    schemas: Arc<SchemaCatalog>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    kind: String,
    data: Value,
    revision: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl DocumentRow {
    fn into_document(self) -> Document {
        let fields = match self.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Document {
            id: self.id.to_string(),
            kind: self.kind,
            fields,
            created_at: self.created_at,
            updated_at: self.updated_at,
            revision: self.revision,
        }
    }
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, schemas: Arc<SchemaCatalog>) -> Self {
        Self {
            pool: Arc::new(pool),
            schemas,
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    async fn expand(
        &self,
        schema: &Schema,
        docs: &mut [Document],
        expansions: &[Expansion],
    ) -> Result<(), StoreError> {
        for expansion in expansions {
            let Some(target) = schema
                .field(expansion.path)
                .and_then(|spec| spec.reference_target())
            else {
                continue;
            };
            let ids = collect_reference_ids(docs, expansion.path);
            let uuids: Vec<Uuid> = ids
                .iter()
                .filter_map(|id| Uuid::parse_str(id).ok())
                .collect();

            let mut resolved = HashMap::new();
            if !uuids.is_empty() {
                let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE kind = $1 AND id = ANY($2)"
                ))
                .bind(target)
                .bind(&uuids)
                .fetch_all(self.pool.as_ref())
                .await
                .map_err(map_sqlx_error)?;
                for row in rows {
                    let doc = row.into_document();
                    let embedded = doc.to_embedded_value(expansion.select);
                    resolved.insert(doc.id, embedded);
                }
            }
            for doc in docs.iter_mut() {
                embed_resolved(doc, expansion.path, &resolved);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(
        &self,
        kind: &str,
        payload: &Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let schema = self.schemas.require(kind)?;
        let fields = schema.validate_create(payload)?;

        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        ensure_unique(&mut conn, schema, &fields, None).await?;

        let row: DocumentRow = sqlx::query_as(&format!(
            "INSERT INTO documents (id, kind, data) VALUES ($1, $2, $3) \
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(kind)
        .bind(Value::Object(fields))
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_document())
    }

    async fn find_by_id(
        &self,
        kind: &str,
        id: &str,
        expansions: &[Expansion],
    ) -> Result<Option<Document>, StoreError> {
        let schema = self.schemas.require(kind)?;
        let Ok(uuid) = Uuid::parse_str(id) else {
            // A malformed id cannot name any document.
            return Ok(None);
        };

        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE kind = $1 AND id = $2"
        ))
        .bind(kind)
        .bind(uuid)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut docs = vec![row.into_document()];
        self.expand(schema, &mut docs, expansions).await?;
        Ok(docs.pop())
    }

    async fn find(
        &self,
        kind: &str,
        query: &DocumentQuery,
        expansions: &[Expansion],
    ) -> Result<Vec<Document>, StoreError> {
        let schema = self.schemas.require(kind)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE kind = "
        ));
        qb.push_bind(kind.to_string());
        for filter in &query.filters {
            push_filter(&mut qb, schema, filter);
        }
        push_order_by(&mut qb, schema, &query.sort);
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if query.skip > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
        }

        let rows: Vec<DocumentRow> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)?;

        let mut docs: Vec<Document> = rows.into_iter().map(DocumentRow::into_document).collect();
        self.expand(schema, &mut docs, expansions).await?;
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
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let changes = schema.validate_update(patch)?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE kind = $1 AND id = $2 FOR UPDATE"
        ))
        .bind(kind)
        .bind(uuid)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut fields = match row.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (name, value) in changes {
            if value.is_null() {
                fields.remove(&name);
            } else {
                fields.insert(name, value);
            }
        }
        ensure_unique(&mut tx, schema, &fields, Some(uuid)).await?;

        let updated: DocumentRow = sqlx::query_as(&format!(
            "UPDATE documents SET data = $3, revision = revision + 1, updated_at = now() \
             WHERE kind = $1 AND id = $2 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(kind)
        .bind(uuid)
        .bind(Value::Object(fields))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(updated.into_document()))
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.schemas.require(kind)?;
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "DELETE FROM documents WHERE kind = $1 AND id = $2 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(kind)
        .bind(uuid)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(DocumentRow::into_document))
    }

    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

/// Reject the write when another document of the same kind already
/// holds one of the payload's unique values.
async fn ensure_unique(
    conn: &mut PgConnection,
    schema: &Schema,
    fields: &Map<String, Value>,
    exclude: Option<Uuid>,
) -> Result<(), StoreError> {
    for spec in schema.unique_fields() {
        let Some(value) = fields.get(spec.name()) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM documents WHERE kind = ");
        qb.push_bind(schema.kind());
        qb.push(" AND data -> ");
        qb.push_bind(spec.name());
        qb.push(" = ");
        qb.push_bind(value.clone());
        if let Some(id) = exclude {
            qb.push(" AND id <> ");
            qb.push_bind(id);
        }
        qb.push(" LIMIT 1");

        let clash = qb
            .build()
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        if clash.is_some() {
            return Err(StoreError::UniqueViolation {
                field: spec.name().to_string(),
            });
        }
    }
    Ok(())
}

enum ValueCast {
    Text,
    Numeric,
    Boolean,
    Timestamptz,
}

impl ValueCast {
    fn suffix(&self) -> &'static str {
        match self {
            ValueCast::Text => "",
            ValueCast::Numeric => "::numeric",
            ValueCast::Boolean => "::boolean",
            ValueCast::Timestamptz => "::timestamptz",
        }
    }

    fn array_suffix(&self) -> &'static str {
        match self {
            ValueCast::Text => "",
            ValueCast::Numeric => "::numeric[]",
            ValueCast::Boolean => "::boolean[]",
            ValueCast::Timestamptz => "::timestamptz[]",
        }
    }
}

fn cast_for(schema: &Schema, field: &str) -> ValueCast {
    match schema.field(field).map(|spec| spec.field_type()) {
        Some(FieldType::Number) => ValueCast::Numeric,
        Some(FieldType::Boolean) => ValueCast::Boolean,
        Some(FieldType::Timestamp) => ValueCast::Timestamptz,
        _ => ValueCast::Text,
    }
}

/// Push the SQL expression that reads `field` from a row. Ids and
/// timestamps are real columns; everything else extracts from the
/// JSONB payload with a bound key and a schema-driven cast.
fn push_field_expr(qb: &mut QueryBuilder<'_, Postgres>, schema: &Schema, field: &str) -> ValueCast {
    match field {
        "id" => {
            qb.push("id::text");
            ValueCast::Text
        }
        "created_at" => {
            qb.push("created_at");
            ValueCast::Timestamptz
        }
        "updated_at" => {
            qb.push("updated_at");
            ValueCast::Timestamptz
        }
        _ => {
            let cast = cast_for(schema, field);
            qb.push("((data ->> ");
            qb.push_bind(field.to_string());
            qb.push(")");
            qb.push(cast.suffix());
            qb.push(")");
            cast
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, schema: &Schema, filter: &FieldFilter) {
    if let FilterPredicate::AnyOf(values) = &filter.predicate {
        qb.push(" AND ");
        let cast = push_field_expr(qb, schema, &filter.field);
        qb.push(" = ANY((");
        qb.push_bind(values.clone());
        qb.push(")");
        qb.push(cast.array_suffix());
        qb.push(")");
        return;
    }

    let (op, raw) = match &filter.predicate {
        FilterPredicate::Eq(raw) => ("=", raw),
        FilterPredicate::Gt(raw) => (">", raw),
        FilterPredicate::Gte(raw) => (">=", raw),
        FilterPredicate::Lt(raw) => ("<", raw),
        FilterPredicate::Lte(raw) => ("<=", raw),
        FilterPredicate::AnyOf(_) => return,
    };

    qb.push(" AND ");
    let cast = push_field_expr(qb, schema, &filter.field);
    qb.push(" ");
    qb.push(op);
    qb.push(" (");
    qb.push_bind(raw.clone());
    qb.push(")");
    qb.push(cast.suffix());
}

fn push_order_by(qb: &mut QueryBuilder<'_, Postgres>, schema: &Schema, sort: &[SortKey]) {
    qb.push(" ORDER BY ");
    for key in sort {
        push_field_expr(qb, schema, &key.field);
        qb.push(if key.descending { " DESC" } else { " ASC" });
        // Documents without the field sort last either way.
        qb.push(" NULLS LAST, ");
    }
    qb.push("id ASC");
}
