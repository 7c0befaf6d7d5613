//! Execution facade
//!
//! [`SearchIndex`] binds an engine to one index and runs accumulated
//! queries against it: fetch, count, aggregate, cursor pagination,
//! update/delete by query, and bulk writes.

use crate::builder::QueryBuilder;
use crate::config::ExecutionConfig;
use crate::engine::{BulkAction, BulkRequest, SearchEngine};
use crate::error::{EngineError, Error, Result, ValidationError};
use crate::metrics::{record_chunk_plan, record_operation_error, record_operation_success};
use crate::processing::{
    chunk_ranges, extract_min_max, extract_sources, AggregateOutput, AggregationFlattener,
    ChunkProcessor, MinMaxResponse,
};
use crate::query::{EsAggregation, QueryCompiler, Script, SearchRequest, WriteByQueryRequest};
use crate::response::{WriteByQueryResponse, WriteResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// A document that knows its own id
pub trait Identifiable {
    fn id(&self) -> String;
}

/// One page of a search-after scan
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    /// Sort values of the last hit; pass to the next call
    pub next: Option<Vec<Value>>,
}

impl<T> CursorPage<T> {
    /// True when no further page can contain documents.
    ///
    /// `previous` is the cursor this page was fetched with; a page whose
    /// `next` repeats it would return the same page again.
    pub fn is_exhausted(&self, requested: usize, previous: Option<&[Value]>) -> bool {
        match &self.next {
            None => true,
            Some(next) => self.items.len() < requested || previous == Some(next.as_slice()),
        }
    }
}

/// Query execution against a single index
#[derive(Clone)]
pub struct SearchIndex {
    engine: Arc<dyn SearchEngine>,
    name: String,
    config: ExecutionConfig,
    refresh: bool,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl SearchIndex {
    pub fn new(engine: Arc<dyn SearchEngine>, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            config: ExecutionConfig::default(),
            refresh: true,
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether writes wait for the index to refresh
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn processor(&self) -> ChunkProcessor {
        ChunkProcessor::new(self.config.concurrent_batch).with_cancellation(self.cancel.clone())
    }

    /// One engine round-trip, raced against the cancellation token
    async fn call<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, EngineError>>,
    {
        let result = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    result = call => result,
                }
            }
            None => call.await,
        };
        result.map_err(|e| Error::engine(operation, e))
    }

    /// Time an operation and record its outcome
    async fn instrument<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = work.await;
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => {
                record_operation_success(operation, elapsed);
                tracing::debug!(
                    index = %self.name,
                    operation,
                    duration_ms = elapsed.as_millis() as u64,
                    "Operation completed"
                );
            }
            Err(e) => {
                record_operation_error(operation, e.error_type(), elapsed);
                tracing::debug!(index = %self.name, operation, error = %e, "Operation failed");
            }
        }
        result
    }

    // ========================================================================
    // Documents by id
    // ========================================================================

    /// Fetch a single document by id
    pub async fn find<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        self.instrument("find", self.run_find(id)).await
    }

    /// Create documents under freshly generated ids
    pub async fn insert<T: Serialize>(&self, items: &[T]) -> Result<WriteResponse> {
        self.instrument("insert", self.run_insert(items)).await
    }

    /// Partially update documents by their own ids
    pub async fn update<T: Serialize + Identifiable>(&self, items: &[T]) -> Result<WriteResponse> {
        self.instrument("update", self.run_update(items)).await
    }

    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<WriteResponse> {
        let mut request = BulkRequest::new();
        for id in ids {
            request.add(BulkAction::Delete {
                id: id.as_ref().to_string(),
            });
        }
        self.instrument("delete", self.dispatch_bulk("delete", request, ids.len()))
            .await
    }

    async fn run_find<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        let response = self.call("find", self.engine.get(&self.name, id)).await?;
        match response.source {
            Some(source) if response.found => Ok(serde_json::from_value(source)?),
            _ => Err(Error::NotFound(id.to_string())),
        }
    }

    async fn run_insert<T: Serialize>(&self, items: &[T]) -> Result<WriteResponse> {
        let mut request = BulkRequest::new();
        for item in items {
            request.add(BulkAction::Create {
                id: uuid::Uuid::new_v4().to_string(),
                doc: serde_json::to_value(item)?,
            });
        }
        self.dispatch_bulk("insert", request, items.len()).await
    }

    async fn run_update<T: Serialize + Identifiable>(&self, items: &[T]) -> Result<WriteResponse> {
        let mut request = BulkRequest::new();
        for item in items {
            request.add(BulkAction::Update {
                id: item.id(),
                doc: serde_json::to_value(item)?,
            });
        }
        self.dispatch_bulk("update", request, items.len()).await
    }

    async fn dispatch_bulk(
        &self,
        operation: &'static str,
        request: BulkRequest,
        expected: usize,
    ) -> Result<WriteResponse> {
        if request.number_of_actions() != expected {
            return Err(Error::CountMismatch {
                stage: "before",
                expected,
                actual: request.number_of_actions(),
            });
        }

        let response = self
            .call(operation, self.engine.bulk(&self.name, &request, self.refresh))
            .await?;

        if response.items.len() != expected {
            return Err(Error::CountMismatch {
                stage: "after",
                expected,
                actual: response.items.len(),
            });
        }

        let failed = response.failed_items().count();
        if failed > 0 {
            tracing::warn!(index = %self.name, operation, failed, "Bulk request had failed items");
        }
        tracing::info!(
            index = %self.name,
            operation,
            actions = expected,
            took = response.took,
            "Bulk request completed"
        );
        Ok(response)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All matching documents, in engine order
    pub async fn get<T>(&self, query: &QueryBuilder) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.instrument("get", self.run_get(query)).await
    }

    /// Number of matching documents. Paging directives are ignored.
    pub async fn count(&self, query: &QueryBuilder) -> Result<u64> {
        self.instrument("count", self.run_count(query)).await
    }

    /// Run the group-by/stats directives and flatten the buckets
    pub async fn aggregate(&self, query: &QueryBuilder) -> Result<AggregateOutput> {
        self.instrument("aggregate", self.run_aggregate(query)).await
    }

    /// One page of a search-after scan.
    ///
    /// `size` overrides the page size for this call only; `after` is the
    /// `next` value of the previous page, `None` for the first.
    pub async fn cursor<T>(
        &self,
        query: &QueryBuilder,
        size: usize,
        after: Option<Vec<Value>>,
    ) -> Result<CursorPage<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.instrument("cursor", self.run_cursor(query, size, after))
            .await
    }

    async fn run_get<T>(&self, query: &QueryBuilder) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = QueryCompiler::search_request(query).await?;
        let response = self
            .call("get", self.engine.search(&self.name, &request))
            .await?;

        let hits = response.hits.hits;
        record_chunk_plan(
            "get",
            chunk_ranges(hits.len(), self.config.concurrent_batch).len(),
        );
        let items = extract_sources(&self.processor(), hits).await?;
        tracing::info!(
            index = %self.name,
            hits = items.len(),
            took = response.took,
            "Search completed"
        );
        Ok(items)
    }

    async fn run_count(&self, query: &QueryBuilder) -> Result<u64> {
        let compiled = QueryCompiler::compile(query).await?.into_query();
        self.call("count", self.engine.count(&self.name, &compiled))
            .await
    }

    async fn run_aggregate(&self, query: &QueryBuilder) -> Result<AggregateOutput> {
        if !query.has_aggregations() {
            return Err(ValidationError::MissingAggregation.into());
        }
        let request = QueryCompiler::search_request(query).await?;
        let response = self
            .call("aggregate", self.engine.search(&self.name, &request))
            .await?;

        let aggregations = response
            .aggregations
            .ok_or_else(|| Error::Extraction("No aggregations returned".to_string()))?;

        let group_by = query.group_by_fields().unwrap_or_default();
        AggregationFlattener::new(group_by, query.stats_fields()).flatten(&aggregations)
    }

    async fn run_cursor<T>(
        &self,
        query: &QueryBuilder,
        size: usize,
        after: Option<Vec<Value>>,
    ) -> Result<CursorPage<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if size == 0 || size > self.config.cursor_limit {
            return Err(ValidationError::CursorSizeOutOfRange {
                size,
                max: self.config.cursor_limit,
            }
            .into());
        }
        if query.sorts().is_empty() {
            return Err(ValidationError::MissingSort.into());
        }

        let mut request = QueryCompiler::search_request(query).await?;
        // Elasticsearch rejects a non-zero `from` next to `search_after`
        if request.from.take().is_some() {
            tracing::debug!(index = %self.name, "Offset ignored for cursor pagination");
        }
        request.size = Some(size as i64);
        request.search_after = after;

        let response = self
            .call("cursor", self.engine.search(&self.name, &request))
            .await?;

        let hits = response.hits.hits;
        // Taken before chunking so it always reflects the true last hit
        let next = hits
            .last()
            .map(|hit| hit.sort.clone())
            .filter(|sort| !sort.is_empty());

        record_chunk_plan(
            "cursor",
            chunk_ranges(hits.len(), self.config.concurrent_batch).len(),
        );
        let items = extract_sources(&self.processor(), hits).await?;
        tracing::debug!(index = %self.name, page = items.len(), "Cursor page fetched");
        Ok(CursorPage { items, next })
    }

    // ========================================================================
    // Writes by query
    // ========================================================================

    /// Assign `params` on every matching document
    pub async fn execute(
        &self,
        query: &QueryBuilder,
        params: BTreeMap<String, Value>,
    ) -> Result<WriteByQueryResponse> {
        self.instrument("execute", self.run_execute(query, params))
            .await
    }

    /// Delete every matching document
    pub async fn destroy(&self, query: &QueryBuilder) -> Result<WriteByQueryResponse> {
        self.instrument("destroy", self.run_destroy(query)).await
    }

    async fn run_execute(
        &self,
        query: &QueryBuilder,
        params: BTreeMap<String, Value>,
    ) -> Result<WriteByQueryResponse> {
        let script = build_script(params)?;
        let compiled = QueryCompiler::compile(query).await?;
        let request = WriteByQueryRequest {
            query: compiled.into_query(),
            script: Some(script),
        };

        let response = self
            .call(
                "execute",
                self.engine
                    .update_by_query(&self.name, &request, self.refresh),
            )
            .await?;
        self.log_write_by_query("execute", &response);
        Ok(response)
    }

    async fn run_destroy(&self, query: &QueryBuilder) -> Result<WriteByQueryResponse> {
        let compiled = QueryCompiler::compile(query).await?;
        let request = WriteByQueryRequest {
            query: compiled.into_query(),
            script: None,
        };

        let response = self
            .call(
                "destroy",
                self.engine
                    .delete_by_query(&self.name, &request, self.refresh),
            )
            .await?;
        self.log_write_by_query("destroy", &response);
        Ok(response)
    }

    fn log_write_by_query(&self, operation: &'static str, response: &WriteByQueryResponse) {
        if response.version_conflicts > 0 || !response.failures.is_empty() {
            tracing::warn!(
                index = %self.name,
                operation,
                version_conflicts = response.version_conflicts,
                failures = response.failures.len(),
                "Write by query skipped documents"
            );
        }
        tracing::info!(
            index = %self.name,
            operation,
            total = response.total,
            updated = response.updated,
            deleted = response.deleted,
            "Write by query completed"
        );
    }

    // ========================================================================
    // Bounds
    // ========================================================================

    /// Lowest and highest value of `field` among matching documents.
    /// Date fields report the engine's formatted string values.
    pub async fn min_max(
        &self,
        query: &QueryBuilder,
        field: &str,
        is_date: bool,
    ) -> Result<MinMaxResponse> {
        self.instrument("min_max", self.run_min_max(query, field, is_date))
            .await
    }

    async fn run_min_max(
        &self,
        query: &QueryBuilder,
        field: &str,
        is_date: bool,
    ) -> Result<MinMaxResponse> {
        let compiled = QueryCompiler::compile(query).await?;
        let mut request = SearchRequest::new(compiled.into_query());
        request.size = Some(0);
        request
            .aggs
            .insert("min".to_string(), EsAggregation::min(field));
        request
            .aggs
            .insert("max".to_string(), EsAggregation::max(field));

        let response = self
            .call("min_max", self.engine.search(&self.name, &request))
            .await?;
        let aggregations = response
            .aggregations
            .ok_or_else(|| Error::Extraction("No aggregations returned".to_string()))?;
        extract_min_max(&aggregations, is_date)
    }
}

/// `ctx._source.<field> = params.<field>; ` per parameter
pub fn build_script(params: BTreeMap<String, Value>) -> Result<Script> {
    if params.is_empty() {
        return Err(ValidationError::EmptyScriptParams.into());
    }

    let mut source = String::new();
    for field in params.keys() {
        let valid = !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !field.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(ValidationError::InvalidScriptParam(field.clone()).into());
        }
        source.push_str(&format!("ctx._source.{field} = params.{field}; "));
    }

    Ok(Script {
        source,
        lang: "painless".to_string(),
        params,
    })
}
