//! In-memory search engine for integration tests
//!
//! Evaluates the query DSL emitted by the compiler over JSON documents
//! with keyword semantics for `term`/`terms`/sorting and a whitespace
//! analyzer for `match`/`match_phrase`.

#![allow(dead_code)]

use async_trait::async_trait;
use prism_es_query::engine::{BulkAction, BulkRequest, SearchEngine};
use prism_es_query::query::{
    BoolQuery, EsAggregation, EsQuery, RangeParams, SearchRequest, SortClause, SortOrder,
    WriteByQueryRequest,
};
use prism_es_query::response::{
    BulkItem, BulkItemResult, GetResponse, Hit, HitsResponse, SearchResponse, TotalHits,
    WriteByQueryResponse, WriteResponse,
};
use prism_es_query::EngineError;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

const DEFAULT_SIZE: i64 = 10;
const DEFAULT_TERMS_SIZE: usize = 10;

#[derive(Default)]
pub struct MemoryEngine {
    docs: Mutex<Vec<(String, Value)>>,
    calls: AtomicUsize,
    searches: Mutex<Vec<SearchRequest>>,
    drop_bulk_items: AtomicBool,
    fail_searches: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_docs<I: IntoIterator<Item = Value>>(docs: I) -> Self {
        let engine = Self::new();
        {
            let mut stored = engine.docs.lock().unwrap();
            for doc in docs {
                let id = doc
                    .get("id")
                    .map(value_text)
                    .unwrap_or_else(|| stored.len().to_string());
                stored.push((id, doc));
            }
        }
        engine
    }

    /// Number of engine round-trips so far
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    pub fn last_search(&self) -> Option<SearchRequest> {
        self.searches.lock().unwrap().last().cloned()
    }

    pub fn doc(&self, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, doc)| doc.clone())
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    /// Make the next bulk responses report one item fewer than dispatched
    pub fn drop_bulk_items(&self, drop: bool) {
        self.drop_bulk_items.store(drop, AtomicOrdering::SeqCst);
    }

    pub fn fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, AtomicOrdering::SeqCst);
    }

    fn matching(&self, query: &EsQuery) -> Vec<(String, Value)> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, doc)| matches(query, doc))
            .cloned()
            .collect()
    }
}

/// Seeded documents: id `1..=n`, `description` "Description {id}",
/// `subject_id` 1 for the first five and from the eleventh on, 2 otherwise.
pub fn seed_models(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let id = (i + 1).to_string();
            let subject_id = if i < 5 || i > 9 { 1 } else { 2 };
            json!({
                "id": id,
                "description": format!("Description {}", id),
                "subject_id": subject_id,
            })
        })
        .collect()
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn search(
        &self,
        _index: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, EngineError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.searches.lock().unwrap().push(request.clone());
        if self.fail_searches.load(AtomicOrdering::SeqCst) {
            return Err(EngineError::Status {
                status: 503,
                body: "search unavailable".to_string(),
            });
        }

        let mut docs = self.matching(&request.query);
        let total = docs.len() as u64;

        if !request.sort.is_empty() {
            docs.sort_by(|(_, a), (_, b)| compare_docs(&request.sort, a, b));
        }

        if let Some(after) = &request.search_after {
            docs.retain(|(_, doc)| {
                compare_tuple(&request.sort, &sort_values(&request.sort, doc), after)
                    == Ordering::Greater
            });
        }

        let aggregations = if request.aggs.is_empty() {
            None
        } else {
            let all: Vec<&Value> = docs.iter().map(|(_, d)| d).collect();
            Some(run_aggregations(&request.aggs, &all))
        };

        let from = request.from.unwrap_or(0).max(0) as usize;
        let size = request.size.unwrap_or(DEFAULT_SIZE).max(0) as usize;
        let hits = docs
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, doc)| Hit {
                index: "memory".to_string(),
                id,
                score: None,
                sort: if request.sort.is_empty() {
                    Vec::new()
                } else {
                    sort_values(&request.sort, &doc)
                },
                source: doc,
            })
            .collect();

        Ok(SearchResponse {
            took: 1,
            timed_out: false,
            hits: HitsResponse {
                total: Some(TotalHits {
                    value: total,
                    relation: "eq".to_string(),
                }),
                max_score: None,
                hits,
            },
            aggregations,
        })
    }

    async fn count(&self, _index: &str, query: &EsQuery) -> Result<u64, EngineError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.matching(query).len() as u64)
    }

    async fn bulk(
        &self,
        index: &str,
        request: &BulkRequest,
        _refresh: bool,
    ) -> Result<WriteResponse, EngineError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut docs = self.docs.lock().unwrap();
        let mut items = Vec::new();
        let mut errors = false;

        for action in request.actions() {
            let position = docs.iter().position(|(id, _)| id == action.id());
            let (status, result) = match (action, position) {
                (BulkAction::Create { .. }, Some(_)) => (409, "conflict"),
                (BulkAction::Create { id, doc }, None) => {
                    docs.push((id.clone(), doc.clone()));
                    (201, "created")
                }
                (BulkAction::Update { doc, .. }, Some(pos)) => {
                    merge(&mut docs[pos].1, doc);
                    (200, "updated")
                }
                (BulkAction::Delete { .. }, Some(pos)) => {
                    docs.remove(pos);
                    (200, "deleted")
                }
                (_, None) => (404, "not_found"),
            };
            errors |= status >= 300;
            items.push(BulkItem::new(
                action.op_type(),
                BulkItemResult {
                    index: index.to_string(),
                    id: Some(action.id().to_string()),
                    status,
                    result: Some(result.to_string()),
                    error: None,
                },
            ));
        }

        if self.drop_bulk_items.load(AtomicOrdering::SeqCst) {
            items.pop();
        }

        Ok(WriteResponse {
            took: 1,
            errors,
            items,
        })
    }

    async fn update_by_query(
        &self,
        _index: &str,
        request: &WriteByQueryRequest,
        _refresh: bool,
    ) -> Result<WriteByQueryResponse, EngineError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let params = request
            .script
            .as_ref()
            .map(|s| s.params.clone())
            .unwrap_or_default();

        let mut docs = self.docs.lock().unwrap();
        let mut updated = 0;
        for (_, doc) in docs.iter_mut() {
            if matches(&request.query, doc) {
                if let Some(object) = doc.as_object_mut() {
                    for (k, v) in &params {
                        object.insert(k.clone(), v.clone());
                    }
                }
                updated += 1;
            }
        }

        Ok(WriteByQueryResponse {
            took: 1,
            total: updated,
            updated,
            batches: 1,
            ..Default::default()
        })
    }

    async fn delete_by_query(
        &self,
        _index: &str,
        request: &WriteByQueryRequest,
        _refresh: bool,
    ) -> Result<WriteByQueryResponse, EngineError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|(_, doc)| !matches(&request.query, doc));
        let deleted = (before - docs.len()) as u64;

        Ok(WriteByQueryResponse {
            took: 1,
            total: deleted,
            deleted,
            batches: 1,
            ..Default::default()
        })
    }

    async fn get(&self, index: &str, id: &str) -> Result<GetResponse, EngineError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let source = self.doc(id);
        Ok(GetResponse {
            index: index.to_string(),
            id: id.to_string(),
            found: source.is_some(),
            source,
        })
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

// ============================================================================
// Query evaluation
// ============================================================================

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Values at a dotted path; arrays fan out
fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(segment) {
                            next.push(v);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a, b) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            _ => value_text(a).cmp(&value_text(b)),
        },
    }
}

fn in_range(value: &Value, params: &RangeParams) -> bool {
    let check = |bound: &Option<Value>, ok: fn(Ordering) -> bool| {
        bound
            .as_ref()
            .map_or(true, |b| ok(compare_values(value, b)))
    };
    check(&params.gt, |o| o == Ordering::Greater)
        && check(&params.gte, |o| o != Ordering::Less)
        && check(&params.lt, |o| o == Ordering::Less)
        && check(&params.lte, |o| o != Ordering::Greater)
}

fn field_matches<F>(doc: &Value, field: &str, predicate: F) -> bool
where
    F: Fn(&Value) -> bool,
{
    resolve(doc, field).into_iter().any(predicate)
}

fn bool_matches(query: &BoolQuery, doc: &Value) -> bool {
    if !query.must.iter().all(|q| matches(q, doc)) {
        return false;
    }
    if !query.filter.iter().all(|q| matches(q, doc)) {
        return false;
    }
    if query.must_not.iter().any(|q| matches(q, doc)) {
        return false;
    }
    if query.should.is_empty() {
        return true;
    }
    let required = query.minimum_should_match.map(|n| n as usize).unwrap_or(
        if query.must.is_empty() && query.filter.is_empty() {
            1
        } else {
            0
        },
    );
    query.should.iter().filter(|q| matches(q, doc)).count() >= required
}

pub fn matches(query: &EsQuery, doc: &Value) -> bool {
    match query {
        EsQuery::MatchAll(_) => true,
        EsQuery::Term(fields) => fields.iter().all(|(field, expected)| {
            field_matches(doc, field, |v| value_text(v) == value_text(expected))
        }),
        EsQuery::Terms(fields) => fields.iter().all(|(field, expected)| {
            field_matches(doc, field, |v| {
                expected.iter().any(|e| value_text(v) == value_text(e))
            })
        }),
        EsQuery::Range(fields) => fields
            .iter()
            .all(|(field, params)| field_matches(doc, field, |v| in_range(v, params))),
        EsQuery::Match(fields) => fields.iter().all(|(field, m)| {
            let wanted = tokens(&value_text(&m.query));
            field_matches(doc, field, |v| {
                let have = tokens(&value_text(v));
                wanted.iter().any(|t| have.contains(t))
            })
        }),
        EsQuery::MatchPhrase(fields) => fields.iter().all(|(field, m)| {
            let wanted = tokens(&value_text(&m.query));
            field_matches(doc, field, |v| {
                let have = tokens(&value_text(v));
                !wanted.is_empty() && have.windows(wanted.len()).any(|w| w == wanted.as_slice())
            })
        }),
        EsQuery::Bool(b) => bool_matches(b, doc),
        EsQuery::Nested(nested) => {
            // Each nested object is matched on its own, re-rooted under the path
            resolve(doc, &nested.path).into_iter().any(|item| {
                let mut wrapper = Map::new();
                let mut root = &mut wrapper;
                let segments: Vec<&str> = nested.path.split('.').collect();
                for (i, segment) in segments.iter().enumerate() {
                    if i + 1 == segments.len() {
                        root.insert(segment.to_string(), item.clone());
                    } else {
                        root = root
                            .entry(segment.to_string())
                            .or_insert_with(|| Value::Object(Map::new()))
                            .as_object_mut()
                            .unwrap();
                    }
                }
                matches(&nested.query, &Value::Object(wrapper))
            })
        }
    }
}

// ============================================================================
// Sorting
// ============================================================================

fn sort_values(sort: &[SortClause], doc: &Value) -> Vec<Value> {
    sort.iter()
        .map(|clause| {
            let field = clause.field().unwrap_or_default();
            let values = resolve(doc, field);
            let ascending = clause
                .options()
                .map_or(true, |o| o.order == SortOrder::Asc);
            let picked = if ascending {
                values.into_iter().min_by(|a, b| compare_values(a, b))
            } else {
                values.into_iter().max_by(|a, b| compare_values(a, b))
            };
            picked.cloned().unwrap_or(Value::Null)
        })
        .collect()
}

fn compare_tuple(sort: &[SortClause], a: &[Value], b: &[Value]) -> Ordering {
    for (i, clause) in sort.iter().enumerate() {
        let (Some(x), Some(y)) = (a.get(i), b.get(i)) else {
            break;
        };
        let mut ordering = compare_values(x, y);
        if clause.options().map(|o| o.order) == Some(SortOrder::Desc) {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_docs(sort: &[SortClause], a: &Value, b: &Value) -> Ordering {
    compare_tuple(sort, &sort_values(sort, a), &sort_values(sort, b))
}

// ============================================================================
// Aggregations
// ============================================================================

fn run_aggregations(aggs: &BTreeMap<String, EsAggregation>, docs: &[&Value]) -> BTreeMap<String, Value> {
    aggs.iter()
        .map(|(name, agg)| (name.clone(), run_aggregation(agg, docs)))
        .collect()
}

fn numbers(docs: &[&Value], field: &str) -> Vec<f64> {
    docs.iter()
        .flat_map(|doc| resolve(doc, field))
        .filter_map(Value::as_f64)
        .collect()
}

fn run_aggregation(agg: &EsAggregation, docs: &[&Value]) -> Value {
    if let Some(terms) = &agg.terms {
        let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
        for doc in docs {
            for key in resolve(doc, &terms.field) {
                match groups.iter_mut().find(|(k, _)| k == key) {
                    Some((_, members)) => members.push(*doc),
                    None => groups.push((key.clone(), vec![*doc])),
                }
            }
        }
        groups.sort_by(|(ka, a), (kb, b)| b.len().cmp(&a.len()).then_with(|| compare_values(ka, kb)));

        let size = terms.size.unwrap_or(DEFAULT_TERMS_SIZE);
        let other: usize = groups.iter().skip(size).map(|(_, m)| m.len()).sum();
        let buckets: Vec<Value> = groups
            .into_iter()
            .take(size)
            .map(|(key, members)| {
                let mut bucket = Map::new();
                bucket.insert("key".to_string(), key);
                bucket.insert("doc_count".to_string(), json!(members.len()));
                for (name, value) in run_aggregations(&agg.aggs, &members) {
                    bucket.insert(name, value);
                }
                Value::Object(bucket)
            })
            .collect();

        return json!({
            "doc_count_error_upper_bound": 0,
            "sum_other_doc_count": other,
            "buckets": buckets,
        });
    }

    if let Some(stats) = &agg.extended_stats {
        let values = numbers(docs, &stats.field);
        if values.is_empty() {
            return json!({"count": 0, "min": null, "max": null, "avg": null, "sum": 0.0,
                          "sum_of_squares": null, "variance": null, "std_deviation": null});
        }
        let count = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let sum_of_squares: f64 = values.iter().map(|v| v * v).sum();
        let avg = sum / count;
        let variance = sum_of_squares / count - avg * avg;
        return json!({
            "count": values.len(),
            "min": values.iter().cloned().fold(f64::INFINITY, f64::min),
            "max": values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            "avg": avg,
            "sum": sum,
            "sum_of_squares": sum_of_squares,
            "variance": variance,
            "std_deviation": variance.sqrt(),
        });
    }

    let bound = |field: &str, pick_min: bool| {
        let values = numbers(docs, field);
        let picked = if pick_min {
            values.iter().cloned().reduce(f64::min)
        } else {
            values.iter().cloned().reduce(f64::max)
        };
        let as_string = docs
            .iter()
            .flat_map(|doc| resolve(doc, field))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .reduce(|a, b| if (a < b) == pick_min { a } else { b });
        match (picked, as_string) {
            (Some(v), _) => json!({"value": v}),
            (None, Some(s)) => json!({"value": 0.0, "value_as_string": s}),
            (None, None) => json!({"value": null}),
        }
    };

    if let Some(min) = &agg.min {
        return bound(&min.field, true);
    }
    if let Some(max) = &agg.max {
        return bound(&max.field, false);
    }
    json!({})
}
