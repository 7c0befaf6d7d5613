//! Execution configuration

use serde::{Deserialize, Serialize};

/// Tunables for result processing and cursor pagination
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Upper bound on concurrent chunk workers per result set
    #[serde(default = "default_concurrent_batch")]
    pub concurrent_batch: usize,

    /// Largest page size accepted by a cursor request
    #[serde(default = "default_cursor_limit")]
    pub cursor_limit: usize,
}

fn default_concurrent_batch() -> usize {
    10
}

fn default_cursor_limit() -> usize {
    10_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrent_batch: default_concurrent_batch(),
            cursor_limit: default_cursor_limit(),
        }
    }
}

impl ExecutionConfig {
    pub fn with_concurrent_batch(mut self, concurrent_batch: usize) -> Self {
        self.concurrent_batch = concurrent_batch.max(1);
        self
    }

    pub fn with_cursor_limit(mut self, cursor_limit: usize) -> Self {
        self.cursor_limit = cursor_limit;
        self
    }
}
