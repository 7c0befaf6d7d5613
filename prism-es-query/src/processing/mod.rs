//! Hit and aggregation result processing

pub mod aggregations;
pub mod hits;

pub use aggregations::{
    extract_min_max, AggregateOutput, AggregationBucket, AggregationFlattener,
    AggregationResponse, ExtendedStats, MinMaxResponse,
};
pub use hits::{chunk_ranges, extract_sources, ChunkProcessor};
