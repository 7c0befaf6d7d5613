//! Fluent Elasticsearch query building for Prism
//!
//! Predicates are accumulated on a [`QueryBuilder`], validated, compiled
//! into a single boolean query and executed through [`SearchIndex`]
//! against any [`SearchEngine`] implementation.
//!
//! # Predicates
//!
//! - `where` / `where_in` / `where_not_in` (scored, `must` / `must_not`)
//! - `filter` / `filter_in` (non-scoring, `filter`)
//! - `match` / `match_in` / `match_not_in` (full-text)
//! - `match_phrase` / `match_phrase_in` / `match_phrase_not_in`
//! - `*_nested` variants, grouped per object path into `nested` queries
//!
//! # Operations
//!
//! - `find`, `insert`, `update`, `delete` (documents by id, bulk)
//! - `get` (all hits), `count`, `aggregate` (group-by and stats)
//! - `cursor` (search-after pagination)
//! - `execute` / `destroy` (update and delete by query)
//! - `min_max`

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod metrics;
pub mod predicate;
pub mod processing;
pub mod query;
pub mod response;
pub mod scalar;
pub mod schema;

mod validate;

pub use builder::{ClauseSet, NestedGroup, QueryBuilder};
pub use config::ExecutionConfig;
pub use engine::{BulkAction, BulkRequest, SearchEngine};
pub use error::{EngineError, Error, Result, ValidationError};
pub use index::{build_script, CursorPage, Identifiable, SearchIndex};
pub use predicate::Operator;
pub use processing::{AggregateOutput, AggregationBucket, AggregationResponse, ExtendedStats, MinMaxResponse};
pub use query::{CompiledQuery, EsQuery, QueryCompiler, SearchRequest};
pub use scalar::Scalar;
pub use schema::FieldSchema;
