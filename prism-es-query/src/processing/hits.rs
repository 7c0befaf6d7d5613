//! Concurrent chunked hit processing
//!
//! A result set of `n` items is split into at most `concurrent_batch`
//! contiguous chunks of `ceil(n / concurrent_batch)` items. Each chunk
//! runs on its own blocking task tagged with its index; outputs are put
//! back in index order, never completion order.

use crate::error::{Error, Result};
use crate::response::Hit;
use serde::de::DeserializeOwned;
use std::ops::Range;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Contiguous, order-preserving chunk ranges covering `0..len`
pub fn chunk_ranges(len: usize, concurrent_batch: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let chunk_size = len.div_ceil(concurrent_batch.max(1));
    let chunk_count = len.div_ceil(chunk_size);
    (0..chunk_count)
        .map(|i| i * chunk_size..((i + 1) * chunk_size).min(len))
        .collect()
}

/// Fan-out/fan-in coordinator for per-chunk work
#[derive(Debug, Clone)]
pub struct ChunkProcessor {
    concurrent_batch: usize,
    cancel: Option<CancellationToken>,
}

impl ChunkProcessor {
    pub fn new(concurrent_batch: usize) -> Self {
        Self {
            concurrent_batch: concurrent_batch.max(1),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Run `worker` over every chunk of `items` and reassemble the outputs.
    ///
    /// All chunks are awaited; if any failed, the error of the lowest
    /// failing chunk is returned and no output is produced. A fired
    /// cancellation token aborts outstanding chunks.
    pub async fn process<I, O, F>(&self, items: Vec<I>, worker: F) -> Result<Vec<O>>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(Vec<I>) -> Result<Vec<O>> + Send + Sync + 'static,
    {
        let ranges = chunk_ranges(items.len(), self.concurrent_batch);
        let chunk_count = ranges.len();
        tracing::debug!(
            items = items.len(),
            chunks = chunk_count,
            concurrent_batch = self.concurrent_batch,
            "Processing result set in chunks"
        );

        let worker = Arc::new(worker);
        let mut tasks = JoinSet::new();
        let mut remaining = items.into_iter();
        for (index, range) in ranges.into_iter().enumerate() {
            let chunk: Vec<I> = remaining.by_ref().take(range.len()).collect();
            let worker = Arc::clone(&worker);
            tasks.spawn_blocking(move || (index, worker(chunk)));
        }

        let mut slots: Vec<Option<Result<Vec<O>>>> = (0..chunk_count).map(|_| None).collect();
        while let Some(joined) = self.next_result(&mut tasks).await? {
            let (index, output) = joined?;
            slots[index] = Some(output);
        }

        let mut assembled = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(output)) => assembled.extend(output),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(Error::Internal(format!("chunk {} produced no result", index)))
                }
            }
        }
        Ok(assembled)
    }

    async fn next_result<T: 'static>(
        &self,
        tasks: &mut JoinSet<T>,
    ) -> Result<Option<std::result::Result<T, tokio::task::JoinError>>> {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tasks.abort_all();
                        Err(Error::Cancelled)
                    }
                    joined = tasks.join_next() => Ok(joined),
                }
            }
            None => Ok(tasks.join_next().await),
        }
    }
}

/// Deserialize each hit's `_source` into `T`, preserving hit order
pub async fn extract_sources<T>(processor: &ChunkProcessor, hits: Vec<Hit>) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    processor
        .process(hits, |chunk: Vec<Hit>| {
            chunk
                .into_iter()
                .map(|hit| {
                    serde_json::from_value(hit.source).map_err(|e| {
                        Error::Extraction(format!("document '{}' could not be decoded: {}", hit.id, e))
                    })
                })
                .collect()
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    // ========================================================================
    // Chunk plan
    // ========================================================================

    #[test]
    fn test_chunk_ranges() {
        assert!(chunk_ranges(0, 10).is_empty());
        assert_eq!(chunk_ranges(3, 10), vec![0..1, 1..2, 2..3]);
        assert_eq!(chunk_ranges(10, 10).len(), 10);
        // 15 items: chunk size 2, 8 chunks
        let ranges = chunk_ranges(15, 10);
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges[7], 14..15);
        // 101 items: chunk size 11, 10 chunks
        let ranges = chunk_ranges(101, 10);
        assert_eq!(ranges.len(), 10);
        assert_eq!(ranges[9], 99..101);
        assert_eq!(chunk_ranges(5, 0), vec![0..5]);
    }

    // ========================================================================
    // Processing
    // ========================================================================

    #[tokio::test]
    async fn test_first_failing_chunk_wins() {
        let processor = ChunkProcessor::new(4);
        let result = processor
            .process((0..8).collect::<Vec<u32>>(), |chunk| {
                if chunk.contains(&2) || chunk.contains(&6) {
                    Err(Error::Extraction(format!("bad chunk {:?}", chunk)))
                } else {
                    Ok(chunk)
                }
            })
            .await;

        match result {
            Err(Error::Extraction(msg)) => assert!(msg.contains("[2, 3]")),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_waiting() {
        let token = CancellationToken::new();
        let processor = ChunkProcessor::new(2).with_cancellation(Some(token.clone()));
        token.cancel();

        let result = processor
            .process(vec![1u32, 2, 3, 4], |chunk| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(chunk)
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Model {
        id: String,
    }

    fn hit(id: &str, source: serde_json::Value) -> Hit {
        Hit {
            index: "models".to_string(),
            id: id.to_string(),
            score: None,
            source,
            sort: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_extract_sources_in_order() {
        let hits: Vec<Hit> = (1..=15)
            .map(|i| hit(&i.to_string(), json!({"id": i.to_string()})))
            .collect();
        let models: Vec<Model> = extract_sources(&ChunkProcessor::new(10), hits).await.unwrap();
        let ids: Vec<String> = models.into_iter().map(|m| m.id).collect();
        let expected: Vec<String> = (1..=15).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_extract_sources_bad_document_fails_whole_call() {
        let hits = vec![
            hit("1", json!({"id": "1"})),
            hit("2", json!({"id": 2})),
            hit("3", json!({"id": "3"})),
        ];
        let result: Result<Vec<Model>> = extract_sources(&ChunkProcessor::new(10), hits).await;
        match result {
            Err(Error::Extraction(msg)) => assert!(msg.contains("'2'")),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    // ========================================================================
    // Ordering under randomized completion delays
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_output_order_matches_input(
            delays in prop::collection::vec(0u64..5, 0..60),
            batch in 1usize..16,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let items: Vec<(usize, u64)> = delays.iter().copied().enumerate().collect();
            let expected: Vec<usize> = (0..items.len()).collect();

            let output = rt.block_on(async {
                ChunkProcessor::new(batch)
                    .process(items, |chunk: Vec<(usize, u64)>| {
                        let delay = chunk.iter().map(|(_, d)| *d).sum::<u64>();
                        std::thread::sleep(Duration::from_millis(delay));
                        Ok(chunk.into_iter().map(|(i, _)| i).collect())
                    })
                    .await
            }).unwrap();

            prop_assert_eq!(output, expected);
        }
    }
}
