//! Query feature pipeline.
//!
//! Translates raw request query parameters into a [`DocumentQuery`]
//! through four stages: `filter`, `sort`, `limit_fields`, `paginate`.
//! Each stage reads its own parameters and ignores the rest, so the
//! stages compose in any order; callers apply all four.

use crate::application::store::{DocumentQuery, FieldFilter, FilterPredicate, SortKey};
use crate::domain::{QueryParams, QueryValue};

/// Parameter names consumed by the non-filter stages. The filter
/// stage skips them so `page=2` never becomes a field predicate.
const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];

const DEFAULT_SORT_FIELD: &str = "created_at";

/// Paging bounds, sourced from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 500,
        }
    }
}

pub struct QueryFeatures<'a> {
    params: &'a QueryParams,
    limits: PageLimits,
    query: DocumentQuery,
}

impl<'a> QueryFeatures<'a> {
    pub fn new(params: &'a QueryParams, limits: PageLimits) -> Self {
        Self {
            params,
            limits,
            query: DocumentQuery::default(),
        }
    }

    /// Turn every non-reserved parameter into a field predicate.
    /// `price[gte]=10` compares, `status=active` matches exactly, and
    /// a repeated parameter matches any of its values. Parameters
    /// with an unrecognized bracket operator are dropped.
    pub fn filter(mut self) -> Self {
        for (key, value) in self.params.iter() {
            let (field, op) = split_operator(key);
            if RESERVED.contains(&field) {
                continue;
            }
            let predicate = match op {
                None => match value {
                    QueryValue::One(raw) => FilterPredicate::Eq(raw.clone()),
                    QueryValue::Many(raws) => FilterPredicate::AnyOf(raws.clone()),
                },
                Some(op) => {
                    // Range operators take a single bound; when the
                    // parameter repeats, the last value wins.
                    let Some(raw) = last_value(value) else {
                        continue;
                    };
                    match op {
                        "gte" => FilterPredicate::Gte(raw.to_string()),
                        "gt" => FilterPredicate::Gt(raw.to_string()),
                        "lte" => FilterPredicate::Lte(raw.to_string()),
                        "lt" => FilterPredicate::Lt(raw.to_string()),
                        _ => continue,
                    }
                }
            };
            self.query.filters.push(FieldFilter {
                field: field.to_string(),
                predicate,
            });
        }
        self
    }

    /// Parse `sort=a,-b` into sort keys; a leading `-` sorts that
    /// field descending. Without the parameter, newest documents come
    /// first.
    pub fn sort(mut self) -> Self {
        let keys: Vec<SortKey> = self
            .params
            .first("sort")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty() && *token != "-")
                    .map(|token| match token.strip_prefix('-') {
                        Some(field) => SortKey {
                            field: field.to_string(),
                            descending: true,
                        },
                        None => SortKey {
                            field: token.to_string(),
                            descending: false,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.query.sort = if keys.is_empty() {
            vec![SortKey {
                field: DEFAULT_SORT_FIELD.to_string(),
                descending: true,
            }]
        } else {
            keys
        };
        self
    }

    /// Parse `fields=a,b` into a projection of payload fields to keep.
    /// Id and timestamps are always present in responses, so they
    /// need not be listed.
    pub fn limit_fields(mut self) -> Self {
        let projection: Vec<String> = self
            .params
            .first("fields")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty() && !token.starts_with('-'))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if !projection.is_empty() {
            self.query.projection = Some(projection);
        }
        self
    }

    /// Resolve `page` and `limit` into an absolute window. Values
    /// that fail to parse or are not positive fall back to page 1 and
    /// the configured default; the limit is capped at the configured
    /// maximum.
    pub fn paginate(mut self) -> Self {
        let page = positive_or(self.params.first("page"), 1);
        let limit = positive_or(self.params.first("limit"), self.limits.default_limit)
            .min(self.limits.max_limit);

        self.query.skip = (page - 1).saturating_mul(limit);
        self.query.limit = Some(limit);
        self
    }

    pub fn into_query(self) -> DocumentQuery {
        self.query
    }
}

/// Split `price[gte]` into `("price", Some("gte"))`. Keys without a
/// well-formed bracket suffix are plain field names.
fn split_operator(key: &str) -> (&str, Option<&str>) {
    if let Some(open) = key.find('[') {
        if key.ends_with(']') && open + 1 < key.len() - 1 {
            return (&key[..open], Some(&key[open + 1..key.len() - 1]));
        }
    }
    (key, None)
}

fn last_value(value: &QueryValue) -> Option<&str> {
    match value {
        QueryValue::One(raw) => Some(raw),
        QueryValue::Many(raws) => raws.last().map(String::as_str),
    }
}

fn positive_or(raw: Option<&str>, fallback: u64) -> u64 {
    raw.and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|parsed| *parsed > 0)
        .unwrap_or(fallback)
}
