//! Search engine collaborator

use crate::error::EngineError;
use crate::query::{EsQuery, SearchRequest, WriteByQueryRequest};
use crate::response::{GetResponse, SearchResponse, WriteByQueryResponse, WriteResponse};
use async_trait::async_trait;
use serde_json::Value;

/// A single bulk operation
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Fails if a document with the id already exists
    Create { id: String, doc: Value },
    /// Partial document update
    Update { id: String, doc: Value },
    Delete { id: String },
}

impl BulkAction {
    pub fn id(&self) -> &str {
        match self {
            BulkAction::Create { id, .. }
            | BulkAction::Update { id, .. }
            | BulkAction::Delete { id } => id,
        }
    }

    /// Action name as used in the bulk NDJSON body
    pub fn op_type(&self) -> &'static str {
        match self {
            BulkAction::Create { .. } => "create",
            BulkAction::Update { .. } => "update",
            BulkAction::Delete { .. } => "delete",
        }
    }
}

/// Queued bulk actions for one index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRequest {
    actions: Vec<BulkAction>,
}

impl BulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: BulkAction) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn number_of_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }
}

/// Search engine operations used by the execution facade.
///
/// Implementations perform exactly one round-trip per call and never retry.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search request
    async fn search(&self, index: &str, request: &SearchRequest)
        -> Result<SearchResponse, EngineError>;

    /// Count documents matching `query`
    async fn count(&self, index: &str, query: &EsQuery) -> Result<u64, EngineError>;

    /// Dispatch queued bulk actions
    async fn bulk(
        &self,
        index: &str,
        request: &BulkRequest,
        refresh: bool,
    ) -> Result<WriteResponse, EngineError>;

    /// Run a script over every matching document, skipping version conflicts
    async fn update_by_query(
        &self,
        index: &str,
        request: &WriteByQueryRequest,
        refresh: bool,
    ) -> Result<WriteByQueryResponse, EngineError>;

    /// Delete every matching document, skipping version conflicts
    async fn delete_by_query(
        &self,
        index: &str,
        request: &WriteByQueryRequest,
        refresh: bool,
    ) -> Result<WriteByQueryResponse, EngineError>;

    /// Fetch a document by id
    async fn get(&self, index: &str, id: &str) -> Result<GetResponse, EngineError>;
}
