//! Query DSL types and the boolean-query compiler

pub mod compiler;
pub mod types;

pub use compiler::{stats_agg_name, ClauseFamily, QueryCompiler};
pub use types::{
    BoolQuery, CompiledQuery, EsAggregation, EsQuery, FieldAgg, MatchQuery, NestedQuery,
    RangeParams, Script, SearchRequest, SortClause, SortOptions, SortOrder, TermsAgg,
    WriteByQueryRequest,
};
