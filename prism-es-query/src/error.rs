//! Error types for query building and execution

use thiserror::Error;

/// A predicate or directive that cannot be compiled into an executable query.
///
/// Validation errors are always raised before any engine round-trip.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid operator '{operator}' for {context} on field '{field}'")]
    InvalidOperator {
        context: &'static str,
        field: String,
        operator: String,
    },

    #[error("Value ({value}) and operator ({operator}) are incompatible on field '{field}'")]
    IncompatibleValue {
        field: String,
        operator: String,
        value: String,
    },

    #[error("Value for field '{field}' is neither numeric nor a string")]
    UnsupportedValue { field: String },

    #[error("Range operator '{operator}' on field '{field}' needs a numeric or date value")]
    UnrangeableValue { field: String, operator: String },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Limit must be greater than 0, got {0}")]
    InvalidLimit(i64),

    #[error("Offset must be greater than or equal to 0, got {0}")]
    InvalidOffset(i64),

    #[error("Cursor page size must be greater than 0 and less than or equal to {max}, got {size}")]
    CursorSizeOutOfRange { size: usize, max: usize },

    #[error("Cursor pagination requires at least one sort field")]
    MissingSort,

    #[error("Sort field cannot be empty")]
    EmptySortField,

    #[error("Nested sort on '{field}' requires both a field and a path")]
    IncompleteNestedSort { field: String },

    #[error("Nested field '{field}' must use object.property notation")]
    MalformedNestedPath { field: String },

    #[error("Group by requires at least one field")]
    EmptyGroupBy,

    #[error("Aggregate requires a group by or stats directive")]
    MissingAggregation,

    #[error("Update by query requires at least one parameter")]
    EmptyScriptParams,

    #[error("Invalid script parameter name: {0}")]
    InvalidScriptParam(String),
}

/// Failure reported by a search engine implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed engine response: {0}")]
    Malformed(String),
}

/// Errors surfaced by every public query operation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No document found with id: {0}")]
    NotFound(String),

    #[error("Bulk action count mismatch {stage} dispatch: expected {expected}, got {actual}")]
    CountMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Engine error during {operation}: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an engine failure with the operation that issued it
    pub fn engine(operation: &'static str, source: EngineError) -> Self {
        Error::Engine { operation, source }
    }

    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::CountMismatch { .. } => "count_mismatch",
            Error::Engine { .. } => "engine",
            Error::Extraction(_) => "extraction",
            Error::Cancelled => "cancelled",
            Error::Json(_) => "json",
            Error::Internal(_) => "internal",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("worker task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_keeps_operation_context() {
        let err = Error::engine(
            "search",
            EngineError::Status {
                status: 503,
                body: "unavailable".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("search"));
        assert!(msg.contains("503"));
        assert_eq!(err.error_type(), "engine");
    }

    #[test]
    fn test_validation_error_converts() {
        let err: Error = ValidationError::MissingSort.into();
        assert!(err.is_validation());
        assert_eq!(err.error_type(), "validation");
    }
}
