use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// One stored document. `fields` is the schema-validated payload; the
/// identifier and timestamps are envelope metadata maintained by the
/// store. `revision` is internal bookkeeping and never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub kind: String,
    pub fields: Map<String, Value>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub revision: i64,
}

impl Document {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, fields: Map<String, Value>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            kind: kind.into(),
            fields,
            created_at: now,
            updated_at: now,
            revision: 1,
        }
    }

    /// Wire representation: identifier, payload fields, timestamps.
    pub fn to_value(&self) -> Value {
        let mut out = Map::with_capacity(self.fields.len() + 3);
        out.insert("id".to_string(), Value::String(self.id.clone()));
        for (name, value) in &self.fields {
            out.insert(name.clone(), value.clone());
        }
        out.insert("created_at".to_string(), timestamp_value(self.created_at));
        out.insert("updated_at".to_string(), timestamp_value(self.updated_at));
        Value::Object(out)
    }

    /// Wire representation of a document embedded through an expansion
    /// directive. An empty selection embeds the full document.
    pub fn to_embedded_value(&self, select: &[&str]) -> Value {
        if select.is_empty() {
            return self.to_value();
        }
        let mut out = Map::with_capacity(select.len() + 1);
        out.insert("id".to_string(), Value::String(self.id.clone()));
        for name in select {
            if let Some(value) = self.fields.get(*name) {
                out.insert((*name).to_string(), value.clone());
            }
        }
        Value::Object(out)
    }

    /// Apply a field-limiting projection, keeping only the named payload
    /// fields. Metadata is unaffected.
    pub fn project(&mut self, projection: &[String]) {
        self.fields
            .retain(|name, _| projection.iter().any(|keep| keep == name));
    }
}

fn timestamp_value(ts: OffsetDateTime) -> Value {
    ts.format(&Rfc3339)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("Shoes"));
        fields.insert("priority".to_string(), json!(3));
        Document::new("Category", "c1", fields)
    }

    #[test]
    fn wire_value_carries_id_fields_and_timestamps() {
        let value = sample().to_value();
        assert_eq!(value["id"], json!("c1"));
        assert_eq!(value["name"], json!("Shoes"));
        assert_eq!(value["priority"], json!(3));
        assert!(value["created_at"].is_string());
        assert!(value["updated_at"].is_string());
        assert!(value.get("revision").is_none());
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn projection_keeps_only_named_fields() {
        let mut doc = sample();
        doc.project(&["name".to_string()]);
        let value = doc.to_value();
        assert_eq!(value["name"], json!("Shoes"));
        assert!(value.get("priority").is_none());
        assert_eq!(value["id"], json!("c1"));
    }

    #[test]
    fn embedded_value_honors_selection() {
        let doc = sample();
        let embedded = doc.to_embedded_value(&["name"]);
        assert_eq!(embedded, json!({"id": "c1", "name": "Shoes"}));

        let full = doc.to_embedded_value(&[]);
        assert_eq!(full["priority"], json!(3));
    }
}
