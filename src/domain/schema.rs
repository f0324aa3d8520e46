use std::collections::HashMap;

use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::error::DomainError;

/// Payload field types a schema can declare. Reference fields carry the
/// target entity kind so stores can resolve expansion directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Timestamp,
    Reference,
    TextList,
    ReferenceList,
    Object,
}

/// Declarative description of one payload field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: &'static str,
    field_type: FieldType,
    required: bool,
    unique: bool,
    allowed: &'static [&'static str],
    reference: Option<&'static str>,
    default: Option<Value>,
}

impl FieldSpec {
    fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            unique: false,
            allowed: &[],
            reference: None,
            default: None,
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub fn object(name: &'static str) -> Self {
        Self::new(name, FieldType::Object)
    }

    pub fn text_list(name: &'static str) -> Self {
        Self::new(name, FieldType::TextList)
    }

    pub fn reference(name: &'static str, target: &'static str) -> Self {
        let mut spec = Self::new(name, FieldType::Reference);
        spec.reference = Some(target);
        spec
    }

    pub fn reference_list(name: &'static str, target: &'static str) -> Self {
        let mut spec = Self::new(name, FieldType::ReferenceList);
        spec.reference = Some(target);
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn allowed(mut self, values: &'static [&'static str]) -> Self {
        self.allowed = values;
        self
    }

    pub fn default_to(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn reference_target(&self) -> Option<&'static str> {
        self.reference
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        let ok = match self.field_type {
            FieldType::Text => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Timestamp => value
                .as_str()
                .is_some_and(|raw| OffsetDateTime::parse(raw, &Rfc3339).is_ok()),
            FieldType::Reference => value.is_string(),
            FieldType::TextList | FieldType::ReferenceList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldType::Object => value.is_object(),
        };
        if !ok {
            return Err(format!(
                "field `{}` must be {}",
                self.name,
                type_phrase(self.field_type)
            ));
        }
        if !self.allowed.is_empty() {
            let accepted = value
                .as_str()
                .is_some_and(|raw| self.allowed.contains(&raw));
            if !accepted {
                return Err(format!(
                    "field `{}` must be one of: {}",
                    self.name,
                    self.allowed.join(", ")
                ));
            }
        }
        Ok(())
    }
}

fn type_phrase(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "a string",
        FieldType::Number => "a number",
        FieldType::Boolean => "a boolean",
        FieldType::Timestamp => "an RFC 3339 timestamp string",
        FieldType::Reference => "a document identifier string",
        FieldType::TextList => "an array of strings",
        FieldType::ReferenceList => "an array of document identifier strings",
        FieldType::Object => "an object",
    }
}

/// Field catalog for one entity kind. Stores validate every create and
/// update payload through this before touching data.
#[derive(Debug, Clone)]
pub struct Schema {
    kind: &'static str,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(kind: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|spec| spec.unique)
    }

    /// Validate a create payload: unknown fields are dropped, explicit
    /// nulls are treated as absent, defaults fill absent fields, then
    /// required/type/enum constraints apply.
    pub fn validate_create(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<Map<String, Value>, DomainError> {
        let mut accepted = Map::new();
        let mut problems = Vec::new();

        for spec in &self.fields {
            match payload.get(spec.name) {
                Some(value) if !value.is_null() => {
                    match spec.check(value) {
                        Ok(()) => {
                            accepted.insert(spec.name.to_string(), value.clone());
                        }
                        Err(problem) => problems.push(problem),
                    }
                }
                _ => {
                    if let Some(default) = &spec.default {
                        accepted.insert(spec.name.to_string(), default.clone());
                    } else if spec.required {
                        problems.push(format!("missing required field `{}`", spec.name));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(accepted)
        } else {
            Err(DomainError::validation(format!(
                "invalid {} payload: {}",
                self.kind,
                problems.join("; ")
            )))
        }
    }

    /// Validate a partial update: unknown fields are dropped, explicit
    /// nulls pass through (the store unsets the field), present values
    /// must satisfy type/enum constraints. Required fields are not
    /// re-checked; absence means "leave unchanged".
    pub fn validate_update(
        &self,
        patch: &Map<String, Value>,
    ) -> Result<Map<String, Value>, DomainError> {
        let mut accepted = Map::new();
        let mut problems = Vec::new();

        for spec in &self.fields {
            let Some(value) = patch.get(spec.name) else {
                continue;
            };
            if value.is_null() {
                accepted.insert(spec.name.to_string(), Value::Null);
                continue;
            }
            match spec.check(value) {
                Ok(()) => {
                    accepted.insert(spec.name.to_string(), value.clone());
                }
                Err(problem) => problems.push(problem),
            }
        }

        if problems.is_empty() {
            Ok(accepted)
        } else {
            Err(DomainError::validation(format!(
                "invalid {} patch: {}",
                self.kind,
                problems.join("; ")
            )))
        }
    }
}

/// All schemas known to the process, shared between stores.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<&'static str, Schema>,
}

impl SchemaCatalog {
    pub fn new(schemas: Vec<Schema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.kind, s)).collect(),
        }
    }

    pub fn get(&self, kind: &str) -> Option<&Schema> {
        self.schemas.get(kind)
    }

    pub fn require(&self, kind: &str) -> Result<&Schema, DomainError> {
        self.get(kind)
            .ok_or_else(|| DomainError::unknown_kind(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.schemas.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn brand_schema() -> Schema {
        Schema::new(
            "Brand",
            vec![
                FieldSpec::text("name").required().unique(),
                FieldSpec::text("image_alt_text").required(),
                FieldSpec::text("status")
                    .allowed(&["active", "inactive"])
                    .default_to(json!("inactive")),
                FieldSpec::number("priority"),
                FieldSpec::text_list("tags"),
            ],
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn create_applies_defaults_and_drops_unknown_fields() {
        let payload = object(json!({
            "name": "Acme",
            "image_alt_text": "logo",
            "bogus": true,
        }));
        let accepted = brand_schema().validate_create(&payload).expect("valid");
        assert_eq!(accepted["status"], json!("inactive"));
        assert!(accepted.get("bogus").is_none());
    }

    #[test]
    fn create_rejects_missing_required_field() {
        let payload = object(json!({"name": "Acme"}));
        let err = brand_schema().validate_create(&payload).unwrap_err();
        assert!(err.to_string().contains("missing required field `image_alt_text`"));
    }

    #[test]
    fn create_collects_every_problem() {
        let payload = object(json!({"status": "bogus", "priority": "high"}));
        let err = brand_schema().validate_create(&payload).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing required field `name`"));
        assert!(message.contains("field `status` must be one of: active, inactive"));
        assert!(message.contains("field `priority` must be a number"));
    }

    #[test]
    fn create_rejects_enum_violation() {
        let payload = object(json!({
            "name": "Acme",
            "image_alt_text": "logo",
            "status": "archived",
        }));
        let err = brand_schema().validate_create(&payload).unwrap_err();
        assert!(err.to_string().contains("one of: active, inactive"));
    }

    #[test]
    fn create_checks_list_element_types() {
        let payload = object(json!({
            "name": "Acme",
            "image_alt_text": "logo",
            "tags": ["a", 3],
        }));
        let err = brand_schema().validate_create(&payload).unwrap_err();
        assert!(err.to_string().contains("field `tags` must be an array of strings"));
    }

    #[test]
    fn update_is_partial_and_keeps_nulls_for_unset() {
        let patch = object(json!({"status": "active", "priority": null, "bogus": 1}));
        let accepted = brand_schema().validate_update(&patch).expect("valid");
        assert_eq!(accepted["status"], json!("active"));
        assert_eq!(accepted["priority"], Value::Null);
        assert!(accepted.get("bogus").is_none());
        assert!(accepted.get("name").is_none());
    }

    #[test]
    fn update_still_enforces_types() {
        let patch = object(json!({"priority": "urgent"}));
        let err = brand_schema().validate_update(&patch).unwrap_err();
        assert!(err.to_string().contains("field `priority` must be a number"));
    }

    #[test]
    fn catalog_resolves_known_kinds_only() {
        let catalog = SchemaCatalog::new(vec![brand_schema()]);
        assert!(catalog.get("Brand").is_some());
        assert!(catalog.require("Unknown").is_err());
    }
}
