//! Chunked delivery of a list query

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;

use crate::error::FetchError;
use crate::executor::QueryResult;

/// Deliver a list result as consecutive slices of `chunk_size`
///
/// The task runs once, on the first poll, and its whole result is held in
/// memory before the first slice is yielded; this is paging over an
/// already-fetched list, not incremental fetching. The stream is single-pass.
/// A failed task (or a zero `chunk_size`) yields exactly one `Err` and ends.
pub fn stream_query_results<T, F, Fut>(task: F, chunk_size: usize) -> impl Stream<Item = QueryResult<Vec<T>>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = QueryResult<Vec<T>>>,
{
    stream::once(async move {
        if chunk_size == 0 {
            return Err(FetchError::InvalidInput("chunk_size must be greater than 0".to_string()));
        }
        task().await
    })
    .flat_map(move |result| match result {
        Ok(rows) => stream::iter(rows).chunks(chunk_size).map(Ok).left_stream(),
        Err(e) => stream::once(future::ready(Err(e))).right_stream(),
    })
}
