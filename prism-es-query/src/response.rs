//! Raw engine response types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Search response body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsResponse,
    /// Raw aggregation payloads keyed by aggregation name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HitsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<TotalHits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f32>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f32>,
    #[serde(rename = "_source", default)]
    pub source: Value,
    /// Sort key tuple, present when the request was sorted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Single document lookup
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GetResponse {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

/// Bulk response body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

impl WriteResponse {
    /// Items whose status is not 2xx
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items
            .iter()
            .filter_map(BulkItem::result)
            .filter(|r| !(200..300).contains(&r.status))
    }
}

/// `{"<action>": {...}}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BulkItem(pub BTreeMap<String, BulkItemResult>);

impl BulkItem {
    pub fn new(action: &str, result: BulkItemResult) -> Self {
        let mut map = BTreeMap::new();
        map.insert(action.to_string(), result);
        BulkItem(map)
    }

    pub fn action(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn result(&self) -> Option<&BulkItemResult> {
        self.0.values().next()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Update-by-query / delete-by-query response body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WriteByQueryResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub batches: u64,
    #[serde(default)]
    pub version_conflicts: u64,
    #[serde(default)]
    pub noops: u64,
    #[serde(default)]
    pub failures: Vec<Value>,
}
