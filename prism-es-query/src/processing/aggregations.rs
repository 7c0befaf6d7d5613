//! Aggregation bucket tree flattening
//!
//! Turns the raw `terms` chain produced for `group_by(f0, f1, .., fn)`
//! into a typed tree: each bucket at level `i` carries the flattened
//! response of `f(i+1)` in its `items`, and the innermost buckets carry
//! the requested extended stats.

use crate::error::{Error, Result};
use crate::query::stats_agg_name;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One level of a flattened `terms` aggregation
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AggregationResponse {
    #[serde(default)]
    pub doc_count_error_upper_bound: u64,
    #[serde(default)]
    pub sum_other_doc_count: u64,
    pub buckets: Vec<AggregationBucket>,
}

impl AggregationResponse {
    /// Levels of nesting below and including this one
    pub fn depth(&self) -> usize {
        1 + self
            .buckets
            .iter()
            .flat_map(|b| b.items.values())
            .map(AggregationResponse::depth)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregationBucket {
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    pub doc_count: u64,
    /// Sub-aggregation for the next group-by field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, AggregationResponse>,
    /// Extended stats keyed by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, ExtendedStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExtendedStats {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub sum: f64,
    #[serde(default)]
    pub sum_of_squares: Option<f64>,
    #[serde(default)]
    pub variance: Option<f64>,
    #[serde(default)]
    pub std_deviation: Option<f64>,
}

/// Result of an aggregate call
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AggregateOutput {
    /// Outermost group-by field -> flattened tree
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, AggregationResponse>,
    /// Top-level stats when no group-by is present
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, ExtendedStats>,
}

/// Lower and upper bound of a field
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MinMaxResponse {
    pub min: Value,
    pub max: Value,
}

/// Walks raw aggregation payloads for one group-by/stats layout
#[derive(Debug, Clone, Copy)]
pub struct AggregationFlattener<'a> {
    group_by: &'a [String],
    stats: &'a [String],
}

impl<'a> AggregationFlattener<'a> {
    pub fn new(group_by: &'a [String], stats: &'a [String]) -> Self {
        Self { group_by, stats }
    }

    pub fn flatten(&self, raw: &BTreeMap<String, Value>) -> Result<AggregateOutput> {
        let mut output = AggregateOutput::default();

        match self.group_by.first() {
            Some(first) => {
                let level = raw.get(first).ok_or_else(|| {
                    Error::Extraction(format!("response lacks aggregation '{}'", first))
                })?;
                output.groups.insert(first.clone(), self.flatten_level(level, 0)?);
            }
            None => output.stats = self.extract_stats(|name: &str| raw.get(name), "response")?,
        }
        Ok(output)
    }

    fn flatten_level(&self, raw: &Value, depth: usize) -> Result<AggregationResponse> {
        let buckets = raw
            .get("buckets")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Extraction(format!(
                    "aggregation '{}' has no bucket list",
                    self.group_by[depth]
                ))
            })?;

        let next_field = self.group_by.get(depth + 1);
        let mut flattened = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let key = bucket
                .get("key")
                .cloned()
                .ok_or_else(|| Error::Extraction("bucket without key".to_string()))?;
            let doc_count = bucket
                .get("doc_count")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::Extraction(format!("bucket {} without doc_count", key)))?;

            let mut items = BTreeMap::new();
            let mut stats = BTreeMap::new();
            match next_field {
                Some(field) => {
                    let sub = bucket.get(field).ok_or_else(|| {
                        Error::Extraction(format!(
                            "bucket {} lacks sub-aggregation '{}'",
                            key, field
                        ))
                    })?;
                    items.insert(field.clone(), self.flatten_level(sub, depth + 1)?);
                }
                None => {
                    stats = self.extract_stats(
                        |name: &str| bucket.get(name),
                        &format!("bucket {}", key),
                    )?
                }
            }

            flattened.push(AggregationBucket {
                key_as_string: bucket
                    .get("key_as_string")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                key,
                doc_count,
                items,
                stats,
            });
        }

        Ok(AggregationResponse {
            doc_count_error_upper_bound: raw
                .get("doc_count_error_upper_bound")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            sum_other_doc_count: raw
                .get("sum_other_doc_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            buckets: flattened,
        })
    }

    fn extract_stats<'v, L>(&self, lookup: L, owner: &str) -> Result<BTreeMap<String, ExtendedStats>>
    where
        L: Fn(&str) -> Option<&'v Value>,
    {
        let mut stats = BTreeMap::new();
        for field in self.stats {
            let name = stats_agg_name(field);
            let raw = lookup(&name).ok_or_else(|| {
                Error::Extraction(format!("{} lacks stats aggregation '{}'", owner, name))
            })?;
            let parsed: ExtendedStats = serde_json::from_value(raw.clone()).map_err(|e| {
                Error::Extraction(format!("stats aggregation '{}' is malformed: {}", name, e))
            })?;
            stats.insert(field.clone(), parsed);
        }
        Ok(stats)
    }
}

/// Read the `min`/`max` aggregations of a min-max query
pub fn extract_min_max(raw: &BTreeMap<String, Value>, is_date: bool) -> Result<MinMaxResponse> {
    let bound = |name: &str| -> Result<Value> {
        let agg = raw
            .get(name)
            .ok_or_else(|| Error::Extraction(format!("response lacks '{}' aggregation", name)))?;
        let value = if is_date {
            agg.get("value_as_string")
        } else {
            agg.get("value")
        };
        match value {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(Error::Extraction(format!("'{}' bound is missing", name))),
        }
    };

    Ok(MinMaxResponse {
        min: bound("min")?,
        max: bound("max")?,
    })
}
