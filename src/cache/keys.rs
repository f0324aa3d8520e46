//! Cache key derivation.
//!
//! Every cached value lives under `cache:<Kind>:...`. Single documents
//! use the document id as the final segment; list results use a
//! `query:` segment followed by the canonical JSON of the request's
//! query parameters. The `query:` segment keeps the two families from
//! colliding and gives invalidation a stable prefix to sweep.

use crate::domain::QueryParams;

const PREFIX: &str = "cache";
const QUERY_SEGMENT: &str = "query";

/// Key for a single document: `cache:<Kind>:<id>`.
pub fn entry_key(kind: &str, id: &str) -> String {
    format!("{PREFIX}:{kind}:{id}")
}

/// Key for a list result: `cache:<Kind>:query:<canonical-JSON>`.
///
/// Canonicalization sorts parameter names and emits compact JSON, so
/// two requests that differ only in parameter order share one key.
pub fn query_key(kind: &str, params: &QueryParams) -> String {
    format!(
        "{PREFIX}:{kind}:{QUERY_SEGMENT}:{}",
        params.canonical_json()
    )
}

/// Prefix under which every query key for `kind` lives. Sweeping this
/// prefix drops all cached lists for the kind without touching entry
/// keys or other kinds.
pub fn query_prefix(kind: &str) -> String {
    format!("{PREFIX}:{kind}:{QUERY_SEGMENT}:")
}

/// Derive the key for a read: an id selects the entry key, otherwise
/// the query parameters select the list key.
pub fn derive_key(kind: &str, id: Option<&str>, params: &QueryParams) -> String {
    match id {
        Some(id) => entry_key(kind, id),
        None => query_key(kind, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_key_layout() {
        assert_eq!(entry_key("Product", "42"), "cache:Product:42");
    }

    #[test]
    fn query_key_layout_for_empty_params() {
        let params = QueryParams::default();
        assert_eq!(query_key("Product", &params), "cache:Product:query:{}");
    }

    #[test]
    fn query_key_is_order_independent() {
        let a = QueryParams::from_pairs(vec![
            ("page".to_string(), "2".to_string()),
            ("limit".to_string(), "5".to_string()),
        ]);
        let b = QueryParams::from_pairs(vec![
            ("limit".to_string(), "5".to_string()),
            ("page".to_string(), "2".to_string()),
        ]);
        assert_eq!(query_key("Product", &a), query_key("Product", &b));
        assert_eq!(
            query_key("Product", &a),
            r#"cache:Product:query:{"limit":"5","page":"2"}"#
        );
    }

    #[test]
    fn entry_and_query_keys_never_collide() {
        // An id is a single segment, so even an adversarial id cannot
        // produce the `query:` segment plus a JSON object.
        let params = QueryParams::default();
        assert_ne!(entry_key("Product", "query"), query_key("Product", &params));
        assert!(query_key("Product", &params).starts_with(&query_prefix("Product")));
        assert!(!entry_key("Product", "42").starts_with(&query_prefix("Product")));
    }

    #[test]
    fn prefix_is_scoped_to_one_kind() {
        let params = QueryParams::default();
        assert!(!query_key("Brand", &params).starts_with(&query_prefix("Product")));
    }

    #[test]
    fn derive_key_prefers_the_id() {
        let params = QueryParams::from_pairs(vec![("page".to_string(), "3".to_string())]);
        assert_eq!(derive_key("Brand", Some("7"), &params), "cache:Brand:7");
        assert_eq!(
            derive_key("Brand", None, &params),
            r#"cache:Brand:query:{"page":"3"}"#
        );
    }
}
