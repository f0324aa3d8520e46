use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Raw request query parameters. Repeated keys fold into arrays; keys
/// are held sorted so the canonical serialization is independent of
/// request ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: BTreeMap<String, QueryValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.push(key.into(), value.into());
        }
        params
    }

    fn push(&mut self, key: String, value: String) {
        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(key, QueryValue::One(value));
            }
            Some(QueryValue::One(existing)) => {
                let first = std::mem::take(existing);
                self.entries.insert(key, QueryValue::Many(vec![first, value]));
            }
            Some(QueryValue::Many(values)) => values.push(value),
        }
    }

    /// Replace the value under `key`, dropping any repeats.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), QueryValue::One(value.into()));
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            QueryValue::One(value) => Some(value),
            QueryValue::Many(values) => values.first().map(String::as_str),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical JSON form used for cache keys: keys sorted, single
    /// values as strings, repeats as string arrays, compact encoding.
    pub fn canonical_json(&self) -> String {
        let mut object = Map::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let json = match value {
                QueryValue::One(value) => Value::String(value.clone()),
                QueryValue::Many(values) => Value::Array(
                    values.iter().cloned().map(Value::String).collect(),
                ),
            };
            object.insert(key.clone(), json);
        }
        Value::Object(object).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_keys_fold_into_arrays() {
        let params = QueryParams::from_pairs([("tag", "a"), ("tag", "b"), ("page", "2")]);
        assert_eq!(
            params.iter().find(|(key, _)| *key == "tag").map(|(_, v)| v),
            Some(&QueryValue::Many(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(params.first("page"), Some("2"));
        assert_eq!(params.first("tag"), Some("a"));
    }

    #[test]
    fn canonical_form_is_sorted_and_compact() {
        let params = QueryParams::from_pairs([("page", "2"), ("limit", "5")]);
        assert_eq!(params.canonical_json(), r#"{"limit":"5","page":"2"}"#);
    }

    #[test]
    fn canonical_form_ignores_insertion_order() {
        let forward = QueryParams::from_pairs([("limit", "5"), ("page", "2")]);
        let reversed = QueryParams::from_pairs([("page", "2"), ("limit", "5")]);
        assert_eq!(forward.canonical_json(), reversed.canonical_json());
    }

    #[test]
    fn empty_params_serialize_as_empty_object() {
        assert_eq!(QueryParams::default().canonical_json(), "{}");
    }

    #[test]
    fn arrays_keep_value_order() {
        let params = QueryParams::from_pairs([("tag", "b"), ("tag", "a")]);
        assert_eq!(params.canonical_json(), r#"{"tag":["b","a"]}"#);
    }
}
