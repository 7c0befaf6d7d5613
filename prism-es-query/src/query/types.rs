//! Elasticsearch Query DSL types
//!
//! The subset of the DSL the compiler emits: boolean composition over
//! `term`, `terms`, `range`, `match`, `match_phrase` and `nested`
//! clauses, plus sorting, paging and `terms`/metric aggregations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn single<V>(field: impl Into<String>, value: V) -> BTreeMap<String, V> {
    let mut map = BTreeMap::new();
    map.insert(field.into(), value);
    map
}

/// ES Query types
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EsQuery {
    /// Match all documents
    MatchAll(MatchAllQuery),

    /// Match query (analyzed full-text)
    Match(BTreeMap<String, MatchQuery>),

    /// Match phrase query
    MatchPhrase(BTreeMap<String, MatchQuery>),

    /// Term query (exact match, not analyzed)
    Term(BTreeMap<String, Value>),

    /// Terms query (multiple exact matches)
    Terms(BTreeMap<String, Vec<Value>>),

    /// Range query
    Range(BTreeMap<String, RangeParams>),

    /// Bool query (must, should, must_not, filter)
    Bool(BoolQuery),

    /// Query scoped to a nested object path
    Nested(NestedQuery),
}

impl EsQuery {
    pub fn match_all() -> Self {
        EsQuery::MatchAll(MatchAllQuery::default())
    }

    pub fn term(field: impl Into<String>, value: Value) -> Self {
        EsQuery::Term(single(field, value))
    }

    pub fn terms(field: impl Into<String>, values: Vec<Value>) -> Self {
        EsQuery::Terms(single(field, values))
    }

    pub fn range(field: impl Into<String>, params: RangeParams) -> Self {
        EsQuery::Range(single(field, params))
    }

    pub fn match_query(field: impl Into<String>, query: Value) -> Self {
        EsQuery::Match(single(field, MatchQuery { query }))
    }

    pub fn match_phrase(field: impl Into<String>, query: Value) -> Self {
        EsQuery::MatchPhrase(single(field, MatchQuery { query }))
    }

    pub fn nested(path: impl Into<String>, query: EsQuery) -> Self {
        EsQuery::Nested(NestedQuery {
            path: path.into(),
            query: Box::new(query),
        })
    }

    pub fn as_bool(&self) -> Option<&BoolQuery> {
        match self {
            EsQuery::Bool(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MatchAllQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatchQuery {
    pub query: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RangeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
            && self.filter.is_empty()
    }

    /// Disjunction of `clauses` with at least one required to match
    pub fn any_of(clauses: Vec<EsQuery>) -> Self {
        Self {
            should: clauses,
            minimum_should_match: Some(1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NestedQuery {
    pub path: String,
    pub query: Box<EsQuery>,
}

/// The boolean query tree produced by the compiler.
///
/// Immutable once built; each execution compiles a fresh one.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    root: BoolQuery,
}

impl CompiledQuery {
    pub(crate) fn new(root: BoolQuery) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &BoolQuery {
        &self.root
    }

    pub fn to_query(&self) -> EsQuery {
        EsQuery::Bool(self.root.clone())
    }

    pub fn into_query(self) -> EsQuery {
        EsQuery::Bool(self.root)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(EsQuery::Bool(self.root.clone())).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NestedSort {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SortOptions {
    pub order: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedSort>,
}

/// `{"<field>": {"order": "asc"}}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SortClause(pub BTreeMap<String, SortOptions>);

impl SortClause {
    pub fn new(field: impl Into<String>, ascending: bool, nested_path: Option<String>) -> Self {
        let order = if ascending {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        };
        SortClause(single(
            field,
            SortOptions {
                order,
                nested: nested_path.map(|path| NestedSort { path }),
            },
        ))
    }

    pub fn field(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn options(&self) -> Option<&SortOptions> {
        self.0.values().next()
    }
}

/// ES Aggregation types
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EsAggregation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<TermsAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_stats: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<FieldAgg>,

    // Nested aggregations
    #[serde(default, alias = "aggregations", skip_serializing_if = "BTreeMap::is_empty")]
    pub aggs: BTreeMap<String, EsAggregation>,
}

impl EsAggregation {
    pub fn terms(field: impl Into<String>) -> Self {
        Self {
            terms: Some(TermsAgg {
                field: field.into(),
                size: None,
            }),
            ..Self::default()
        }
    }

    pub fn extended_stats(field: impl Into<String>) -> Self {
        Self {
            extended_stats: Some(FieldAgg::new(field)),
            ..Self::default()
        }
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self {
            min: Some(FieldAgg::new(field)),
            ..Self::default()
        }
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self {
            max: Some(FieldAgg::new(field)),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldAgg {
    pub field: String,
}

impl FieldAgg {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TermsAgg {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// Search request body
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchRequest {
    pub query: EsQuery,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,

    #[serde(default, alias = "aggregations", skip_serializing_if = "BTreeMap::is_empty")]
    pub aggs: BTreeMap<String, EsAggregation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,
}

impl SearchRequest {
    pub fn new(query: EsQuery) -> Self {
        Self {
            query,
            from: None,
            size: None,
            sort: Vec::new(),
            aggs: BTreeMap::new(),
            search_after: None,
        }
    }
}

/// Painless field-assignment script
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Script {
    pub source: String,
    pub lang: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

/// Update-by-query / delete-by-query body
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WriteByQueryRequest {
    pub query: EsQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
}
